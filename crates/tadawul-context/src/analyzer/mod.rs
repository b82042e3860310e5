//! Lexical entity, sentiment and risk analysis
//!
//! Everything here is a pure function of the input text, the gazetteer and an
//! optional "current company" carried over from the previous turn.

mod keywords;
mod sentiment;
mod tokens;

pub use sentiment::{RiskLevel, Sentiment};

use crate::conversation::FinancialMetadata;
use crate::gazetteer::{Gazetteer, Instrument};
use keywords::{GENERIC_NAME_TOKENS, keywords_ar, keywords_en};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokens::{contains_any, contains_term, matched_labels, term_positions, tokenize};

const SYMBOL_WEIGHT: f64 = 0.4;
const NAME_WEIGHT: f64 = 0.3;
const LOCALIZED_NAME_WEIGHT: f64 = 0.3;
const PARTIAL_WEIGHT: f64 = 0.2;
const CONTEXTUAL_WEIGHT: f64 = 0.1;

/// Matches below this confidence are dropped
const MIN_MATCH_CONFIDENCE: f64 = 0.3;

/// Confidence given to a company carried over from the previous turn
const CONTINUED_DISCUSSION_CONFIDENCE: f64 = 0.4;

/// Name tokens must be longer than this to take part in partial matching
const PARTIAL_MIN_TOKEN_LEN: usize = 3;

/// A company recognised in text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMatch {
    pub symbol: String,
    pub name: String,
    pub sector: Option<String>,
    pub is_continued_discussion: bool,
    pub confidence: f64,
}

/// Everything the analyzer extracts from one piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnalysis {
    pub companies: Vec<CompanyMatch>,
    pub sectors: Vec<String>,
    pub markets: Vec<String>,
    pub technical_indicators: Vec<String>,
    pub fundamental_factors: Vec<String>,
    pub timeframes: Vec<String>,
    pub metrics: Vec<String>,
    /// Text touches on regulation or listing rules
    pub regulatory: bool,
    pub sentiment_score: i32,
    pub sentiment: Sentiment,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub confidence: f64,
}

impl TextAnalysis {
    /// Highest-confidence company, if any
    pub fn primary_company(&self) -> Option<&CompanyMatch> {
        self.companies.first()
    }

    pub fn mentions_market(&self) -> bool {
        !self.markets.is_empty()
    }
}

/// Gazetteer-driven lexical analyzer
#[derive(Debug, Clone)]
pub struct EntityAnalyzer {
    gazetteer: Arc<Gazetteer>,
}

impl EntityAnalyzer {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    /// Companies mentioned in `text`, most confident first
    pub fn match_companies(&self, text: &str, current_company: Option<&str>) -> Vec<CompanyMatch> {
        let lowered = text.to_lowercase();
        let tokens = tokenize(text);

        let mut matches: Vec<CompanyMatch> = self
            .gazetteer
            .instruments()
            .iter()
            .filter_map(|instrument| self.score_instrument(instrument, &lowered, &tokens))
            .collect();

        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let refers_to_company = contains_any(&tokens, keywords_en::COMPANY_REFERENCES)
            || contains_any(&tokens, keywords_ar::COMPANY_REFERENCES);

        if let (true, Some(current), true) = (matches.is_empty(), current_company, refers_to_company)
        {
            let known = self.gazetteer.get(current);
            matches.push(CompanyMatch {
                symbol: known.map_or_else(|| current.to_string(), |i| i.symbol.clone()),
                name: known.map_or_else(|| current.to_string(), |i| i.name.clone()),
                sector: known.and_then(|i| i.sector.clone()),
                is_continued_discussion: true,
                confidence: CONTINUED_DISCUSSION_CONFIDENCE,
            });
        }

        matches
    }

    fn score_instrument(
        &self,
        instrument: &Instrument,
        lowered: &str,
        tokens: &[String],
    ) -> Option<CompanyMatch> {
        let symbol_hit = !instrument.symbol.is_empty()
            && lowered.contains(&instrument.symbol.to_lowercase());
        let name_hit =
            !instrument.name.is_empty() && lowered.contains(&instrument.name.to_lowercase());
        let localized_hit = instrument
            .localized_name
            .as_deref()
            .is_some_and(|n| !n.is_empty() && lowered.contains(&n.to_lowercase()));
        let partial_hit =
            !(symbol_hit || name_hit || localized_hit) && partial_name_match(instrument, tokens);
        let contextual_hit = instrument.sector.as_deref().is_some_and(|sector| {
            self.gazetteer
                .sector_terms(sector)
                .iter()
                .any(|term| contains_term(tokens, term))
        });

        let confidence = [
            (symbol_hit, SYMBOL_WEIGHT),
            (name_hit, NAME_WEIGHT),
            (localized_hit, LOCALIZED_NAME_WEIGHT),
            (partial_hit, PARTIAL_WEIGHT),
            (contextual_hit, CONTEXTUAL_WEIGHT),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum::<f64>()
        .clamp(0.0, 1.0);
        // 0.2 + 0.1 must compare equal to the 0.3 floor
        let confidence = (confidence * 1e9).round() / 1e9;

        if confidence < MIN_MATCH_CONFIDENCE {
            return None;
        }

        tracing::debug!(
            symbol = %instrument.symbol,
            confidence,
            symbol_hit,
            name_hit,
            localized_hit,
            partial_hit,
            contextual_hit,
            "company matched"
        );

        Some(CompanyMatch {
            symbol: instrument.symbol.clone(),
            name: instrument.name.clone(),
            sector: instrument.sector.clone(),
            is_continued_discussion: false,
            confidence,
        })
    }

    /// Net sentiment score, global or around one company's mentions
    pub fn sentiment_score(&self, text: &str, company: Option<&str>) -> i32 {
        let tokens = tokenize(text);
        let focus = company
            .and_then(|symbol| self.gazetteer.get(symbol))
            .map(|instrument| mention_positions(instrument, &tokens))
            .unwrap_or_default();
        sentiment::sentiment_score(&tokens, &focus)
    }

    /// Strict sentiment (`>1` / `<-1`)
    pub fn sentiment(&self, text: &str, company: Option<&str>) -> Sentiment {
        Sentiment::from_score(self.sentiment_score(text, company))
    }

    /// Lenient sentiment (`>0` / `<0`)
    pub fn lenient_sentiment(&self, text: &str, company: Option<&str>) -> Sentiment {
        Sentiment::from_score_lenient(self.sentiment_score(text, company))
    }

    pub fn risk_level(&self, text: &str) -> RiskLevel {
        RiskLevel::from_score(sentiment::risk_score(&tokenize(text)))
    }

    /// Full analysis of a piece of text
    pub fn analyze(&self, text: &str, current_company: Option<&str>) -> TextAnalysis {
        let tokens = tokenize(text);
        let companies = self.match_companies(text, current_company);

        let sectors: Vec<String> = self
            .gazetteer
            .sectors()
            .filter(|sector| {
                contains_term(&tokens, sector)
                    || self
                        .gazetteer
                        .sector_terms(sector)
                        .iter()
                        .any(|term| contains_term(&tokens, term))
            })
            .map(ToString::to_string)
            .collect();

        let markets = matched_labels(&tokens, &[keywords_en::MARKETS, keywords_ar::MARKETS]);
        let technical_indicators =
            matched_labels(&tokens, &[keywords_en::TECHNICAL, keywords_ar::TECHNICAL]);
        let fundamental_factors =
            matched_labels(&tokens, &[keywords_en::FUNDAMENTAL, keywords_ar::FUNDAMENTAL]);
        let timeframes = matched_labels(&tokens, &[keywords_en::TIMEFRAMES, keywords_ar::TIMEFRAMES]);
        let metrics: Vec<String> = keywords_en::METRICS
            .iter()
            .chain(keywords_ar::METRICS)
            .filter(|term| contains_term(&tokens, term))
            .map(ToString::to_string)
            .collect();

        let regulatory = contains_any(&tokens, keywords_en::REGULATORY)
            || contains_any(&tokens, keywords_ar::REGULATORY);

        let sentiment_score = sentiment::sentiment_score(&tokens, &[]);
        let risk_score = sentiment::risk_score(&tokens);

        let mut confidence = 0.5;
        if companies.iter().any(|c| !c.is_continued_discussion) {
            confidence += 0.2;
        }
        if companies.iter().any(|c| c.is_continued_discussion) {
            confidence += 0.1;
        }
        if let Some(top) = companies.first() {
            confidence += top.confidence * 0.2;
        }
        if !technical_indicators.is_empty() {
            confidence += 0.1;
        }
        if !fundamental_factors.is_empty() {
            confidence += 0.1;
        }
        if !sectors.is_empty() {
            confidence += 0.05;
        }
        if text.chars().any(|c| c.is_ascii_digit()) {
            confidence += 0.05;
        }
        if text.contains('?') || text.contains('؟') {
            confidence += 0.05;
        }
        if !markets.is_empty() {
            confidence += 0.1;
        }
        if tokens.len() < 3 {
            confidence -= 0.2;
        }

        TextAnalysis {
            companies,
            sectors,
            markets,
            technical_indicators,
            fundamental_factors,
            timeframes,
            metrics,
            regulatory,
            sentiment_score,
            sentiment: Sentiment::from_score(sentiment_score),
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            confidence: confidence.clamp(0.1, 0.95),
        }
    }

    /// Metadata attached to a stored message
    pub fn extract_metadata(&self, text: &str, current_company: Option<&str>) -> FinancialMetadata {
        let analysis = self.analyze(text, current_company);
        FinancialMetadata {
            instruments: analysis.companies.iter().map(|c| c.symbol.clone()).collect(),
            companies: analysis.companies.iter().map(|c| c.name.clone()).collect(),
            markets: analysis.markets,
            metrics: analysis.metrics,
            timeframes: analysis.timeframes,
            sentiment: Some(Sentiment::from_score_lenient(analysis.sentiment_score)),
            confidence_score: Some(analysis.confidence),
            risk_level: Some(analysis.risk_level),
            technical_indicators: analysis.technical_indicators,
            fundamental_factors: analysis.fundamental_factors,
        }
    }
}

fn partial_name_match(instrument: &Instrument, tokens: &[String]) -> bool {
    tokenize(&instrument.name)
        .iter()
        .filter(|part| {
            part.chars().count() > PARTIAL_MIN_TOKEN_LEN
                && !GENERIC_NAME_TOKENS.contains(&part.as_str())
        })
        .any(|part| {
            tokens.iter().any(|token| {
                token.chars().count() > PARTIAL_MIN_TOKEN_LEN
                    && (token.contains(part.as_str()) || part.contains(token.as_str()))
            })
        })
}

/// Token indices where an instrument is mentioned by ticker or name
fn mention_positions(instrument: &Instrument, tokens: &[String]) -> Vec<usize> {
    let mut positions = term_positions(tokens, &instrument.symbol);
    for name in std::iter::once(instrument.name.as_str()).chain(instrument.localized_name.as_deref())
    {
        if !name.is_empty() {
            positions.extend(term_positions(tokens, name));
        }
    }
    positions.sort_unstable();
    positions.dedup();
    positions
}
