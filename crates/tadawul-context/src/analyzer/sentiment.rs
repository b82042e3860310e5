//! Bag-of-words sentiment and risk scoring

use super::keywords::{keywords_ar, keywords_en};
use super::tokens::{count_term, term_positions};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens either side of a company mention that count toward its sentiment
const SENTIMENT_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Classification used for query analysis: needs a margin of two terms
    pub fn from_score(score: i32) -> Self {
        if score > 1 {
            Self::Bullish
        } else if score < -1 {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    /// Classification used for message metadata: any net lean counts
    pub fn from_score_lenient(score: i32) -> Self {
        match score.signum() {
            1 => Self::Bullish,
            -1 => Self::Bearish,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: i32) -> Self {
        if score > 2 {
            Self::High
        } else if score < -1 {
            Self::Low
        } else {
            Self::Medium
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Net bullish minus bearish term count.
///
/// With no `focus` positions every occurrence counts; otherwise only those
/// within [`SENTIMENT_WINDOW`] tokens of a focus position.
pub(crate) fn sentiment_score(tokens: &[String], focus: &[usize]) -> i32 {
    let in_scope = |pos: usize| {
        focus.is_empty() || focus.iter().any(|&f| pos.abs_diff(f) <= SENTIMENT_WINDOW)
    };

    let tally = |terms: &[&str]| -> i32 {
        terms
            .iter()
            .map(|term| {
                term_positions(tokens, term)
                    .into_iter()
                    .filter(|&pos| in_scope(pos))
                    .count() as i32
            })
            .sum()
    };

    tally(keywords_en::BULLISH) + tally(keywords_ar::BULLISH)
        - tally(keywords_en::BEARISH)
        - tally(keywords_ar::BEARISH)
}

pub(crate) fn risk_score(tokens: &[String]) -> i32 {
    let weighted = |terms: &[&str], weight: i32| -> i32 {
        terms
            .iter()
            .map(|term| count_term(tokens, term) as i32 * weight)
            .sum()
    };

    weighted(keywords_en::HIGH_RISK, 2)
        + weighted(keywords_ar::HIGH_RISK, 2)
        + weighted(keywords_en::LOW_RISK, -2)
        + weighted(keywords_ar::LOW_RISK, -2)
        + weighted(keywords_en::HEDGING, -1)
        + weighted(keywords_ar::HEDGING, -1)
        + weighted(keywords_en::LEVERAGE, 1)
        + weighted(keywords_ar::LEVERAGE, 1)
}
