//! Context fusion and confidence aggregation
//!
//! Merges per-company market data, retrieved documents and the lexical
//! analysis of the question into one [`FusedContext`].

mod insights;

use crate::analyzer::{RiskLevel, Sentiment, TextAnalysis};
use crate::documents::{DocumentCategory, DocumentSearchResult};
use crate::market::{CompanyMarketData, SignalDirection};
use crate::response::{
    AnalysisQuality, CompanyInfo, ConfidenceReport, DocumentReference, MarketAnalysis,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

const MARKET_CONFIDENCE_WEIGHT: f64 = 0.6;
const DOCUMENT_CONFIDENCE_WEIGHT: f64 = 0.4;
const MAX_OVERALL_CONFIDENCE: f64 = 0.95;

/// Documents beyond this count add no coverage
const DOCUMENT_COVERAGE_TARGET: f64 = 3.0;
/// Documents are considered fully stale after this many days
const DOCUMENT_FRESHNESS_DAYS: f64 = 30.0;

const HIGH_VOLATILITY_CHANGE_PCT: f64 = 5.0;
const HIGH_PE: f64 = 30.0;
const HIGH_DEBT_TO_EQUITY: f64 = 2.0;
const STRONG_SIGNAL: f64 = 0.7;
const RELEVANT_REGULATION: f64 = 0.8;

/// Average move that tips market sentiment either way
const SENTIMENT_CHANGE_PCT: f64 = 1.0;

/// Individually named conditions that raise the risk grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    HighVolatility,
    HighValuation,
    NegativeMargin,
    HighLeverage,
    BearishTechnical,
    RegulatoryExposure,
}

impl RiskFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighVolatility => "high_volatility",
            Self::HighValuation => "high_valuation",
            Self::NegativeMargin => "negative_margin",
            Self::HighLeverage => "high_leverage",
            Self::BearishTechnical => "bearish_technical",
            Self::RegulatoryExposure => "regulatory_exposure",
        }
    }
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the prompt and the response assembler need
#[derive(Debug, Clone, PartialEq)]
pub struct FusedContext {
    pub analysis: TextAnalysis,
    /// Companies whose quote was fetched
    pub companies: Vec<CompanyMarketData>,
    /// Companies named in the question, fetched or not
    pub requested_companies: usize,
    pub documents: Vec<DocumentReference>,
    pub market_sentiment: Sentiment,
    pub risk_flags: Vec<RiskFlag>,
    pub risk_level: RiskLevel,
    pub confidence: ConfidenceReport,
    pub quality: AnalysisQuality,
    pub key_insights: Vec<String>,
    pub suggested_questions: Vec<String>,
    pub market_analysis: MarketAnalysis,
    /// Rendered conversation window block
    pub window_context: String,
}

impl FusedContext {
    pub fn has_market_data(&self) -> bool {
        !self.companies.is_empty()
    }

    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty()
    }

    /// Contract view of the fetched companies
    pub fn company_infos(&self) -> Vec<CompanyInfo> {
        self.companies
            .iter()
            .map(|c| CompanyInfo {
                symbol: c.instrument.symbol.clone(),
                name: c.instrument.name.clone(),
                sector: c.instrument.sector.clone(),
                price: Some(c.quote.price),
                change: Some(c.quote.change_percent),
                analysis: insights::company_summary(c),
            })
            .collect()
    }
}

/// Stateless fusion engine
#[derive(Debug, Clone, Default)]
pub struct ContextFusion;

impl ContextFusion {
    pub fn new() -> Self {
        Self
    }

    /// Fuse market data and documents for one question.
    ///
    /// `documents` are expected ranked best first and already capped.
    pub fn fuse(
        &self,
        analysis: TextAnalysis,
        companies: Vec<CompanyMarketData>,
        documents: &[DocumentSearchResult],
        window_context: String,
        now: DateTime<Utc>,
    ) -> FusedContext {
        let requested_companies = analysis.companies.len();

        let market = market_confidence(&analysis, &companies);
        let document = document_confidence(documents, now);
        let overall = (MARKET_CONFIDENCE_WEIGHT * market + DOCUMENT_CONFIDENCE_WEIGHT * document)
            .clamp(0.0, MAX_OVERALL_CONFIDENCE);

        let risk_flags = risk_flags(&companies, documents);
        let risk_level = risk_level(&risk_flags);
        let market_sentiment = market_sentiment(&analysis, &companies);
        let quality = AnalysisQuality::from_score(quality_score(&companies, documents));

        let document_refs: Vec<DocumentReference> =
            documents.iter().map(insights::document_reference).collect();

        let key_insights =
            insights::key_insights(&companies, documents, &document_refs, risk_level, &risk_flags);
        let suggested_questions = insights::suggested_questions(&analysis, &companies, documents, risk_level);
        let market_analysis = insights::market_analysis(&analysis, &companies, market_sentiment);

        tracing::debug!(
            market_confidence = market,
            document_confidence = document,
            overall,
            risk = %risk_level,
            quality = %quality,
            flags = risk_flags.len(),
            "context fused"
        );

        FusedContext {
            analysis,
            companies,
            requested_companies,
            documents: document_refs,
            market_sentiment,
            risk_flags,
            risk_level,
            confidence: ConfidenceReport {
                market,
                documents: document,
                overall,
            },
            quality,
            key_insights,
            suggested_questions,
            market_analysis,
            window_context,
        }
    }
}

/// `0.5·coverage + 0.3·completeness + 0.2·analysis confidence`, clamped.
///
/// Coverage is the share of requested companies with a quote; completeness
/// averages, over fetched companies, how much of quote, statistics and
/// signals arrived.
pub fn market_confidence(analysis: &TextAnalysis, companies: &[CompanyMarketData]) -> f64 {
    let requested = analysis.companies.len().max(companies.len());
    let coverage = if requested == 0 {
        0.0
    } else {
        companies.len() as f64 / requested as f64
    };

    let completeness = if companies.is_empty() {
        0.0
    } else {
        companies
            .iter()
            .map(|c| {
                let statistics = c.statistics.as_ref().map_or(0.0, |s| s.completeness());
                let signals = if c.signals.is_empty() { 0.0 } else { 1.0 };
                (1.0 + statistics + signals) / 3.0
            })
            .sum::<f64>()
            / companies.len() as f64
    };

    (0.5 * coverage + 0.3 * completeness + 0.2 * analysis.confidence).clamp(0.0, 1.0)
}

/// `avgRelevance·0.4 + avgFreshness·0.3 + coverage·0.3`, clamped to [0, 1]
pub fn document_confidence(documents: &[DocumentSearchResult], now: DateTime<Utc>) -> f64 {
    if documents.is_empty() {
        return 0.0;
    }

    let count = documents.len() as f64;
    let avg_relevance = documents
        .iter()
        .map(|d| d.relevance_score.clamp(0.0, 1.0))
        .sum::<f64>()
        / count;
    let avg_freshness = documents
        .iter()
        .map(|d| {
            let age_days =
                (now - d.document.metadata.last_updated).num_seconds().max(0) as f64 / 86_400.0;
            1.0 - (age_days / DOCUMENT_FRESHNESS_DAYS).min(1.0)
        })
        .sum::<f64>()
        / count;
    let coverage = (count / DOCUMENT_COVERAGE_TARGET).min(1.0);

    (avg_relevance * 0.4 + avg_freshness * 0.3 + coverage * 0.3).clamp(0.0, 1.0)
}

/// Distinct risk flags, in declaration order
pub fn risk_flags(
    companies: &[CompanyMarketData],
    documents: &[DocumentSearchResult],
) -> Vec<RiskFlag> {
    let mut flags = Vec::new();
    let mut raise = |flag: RiskFlag, fired: bool| {
        if fired && !flags.contains(&flag) {
            flags.push(flag);
        }
    };

    let stats = || companies.iter().filter_map(|c| c.statistics.as_ref());

    raise(
        RiskFlag::HighVolatility,
        companies
            .iter()
            .any(|c| c.quote.change_percent.abs() > HIGH_VOLATILITY_CHANGE_PCT),
    );
    raise(
        RiskFlag::HighValuation,
        stats().any(|s| s.pe_ratio.is_some_and(|pe| pe > HIGH_PE)),
    );
    raise(
        RiskFlag::NegativeMargin,
        stats().any(|s| s.profit_margin.is_some_and(|m| m < 0.0)),
    );
    raise(
        RiskFlag::HighLeverage,
        stats().any(|s| s.debt_to_equity.is_some_and(|d| d > HIGH_DEBT_TO_EQUITY)),
    );
    raise(
        RiskFlag::BearishTechnical,
        companies.iter().flat_map(|c| &c.signals).any(|s| {
            s.direction == SignalDirection::Bearish && s.strength > STRONG_SIGNAL
        }),
    );
    raise(
        RiskFlag::RegulatoryExposure,
        documents.iter().any(|d| {
            d.document.metadata.category == DocumentCategory::Regulation
                && d.relevance_score > RELEVANT_REGULATION
        }),
    );

    flags
}

/// High on three flags or any leverage flag, medium on one, else low
pub fn risk_level(flags: &[RiskFlag]) -> RiskLevel {
    if flags.len() >= 3 || flags.contains(&RiskFlag::HighLeverage) {
        RiskLevel::High
    } else if flags.is_empty() {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    }
}

/// Average move of fetched companies; falls back to the text's sentiment
fn market_sentiment(analysis: &TextAnalysis, companies: &[CompanyMarketData]) -> Sentiment {
    if companies.is_empty() {
        return analysis.sentiment;
    }
    let average = insights::average_change(companies);
    if average > SENTIMENT_CHANGE_PCT {
        Sentiment::Bullish
    } else if average < -SENTIMENT_CHANGE_PCT {
        Sentiment::Bearish
    } else {
        analysis.sentiment
    }
}

/// Weighted presence-and-quality score behind the quality grade
pub fn quality_score(companies: &[CompanyMarketData], documents: &[DocumentSearchResult]) -> f64 {
    let has_companies = !companies.is_empty();

    let with_stats: Vec<f64> = companies
        .iter()
        .filter_map(|c| c.statistics.as_ref().map(crate::market::KeyStatistics::completeness))
        .collect();
    let fundamental_quality = mean(&with_stats);

    let with_signals: Vec<f64> = companies
        .iter()
        .filter(|c| !c.signals.is_empty())
        .map(|c| (c.signals.len() as f64 / 3.0).min(1.0))
        .collect();
    let technical_quality = mean(&with_signals);

    let relevances: Vec<f64> = documents
        .iter()
        .map(|d| d.relevance_score.clamp(0.0, 1.0))
        .collect();
    let document_quality = mean(&relevances);

    let presence = |present: bool| if present { 1.0 } else { 0.0 };

    0.2 * presence(has_companies)
        + 0.3 * fundamental_quality * presence(!with_stats.is_empty())
        + 0.2 * technical_quality * presence(!with_signals.is_empty())
        + 0.3 * document_quality * presence(!relevances.is_empty())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
