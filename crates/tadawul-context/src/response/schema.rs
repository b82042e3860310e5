//! Output contract returned for every chat message

use crate::analyzer::{RiskLevel, Sentiment};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserMood {
    Positive,
    #[default]
    Neutral,
    Negative,
    Curious,
    Frustrated,
    Confused,
}

impl UserMood {
    /// Lenient parse; unknown moods are `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            "curious" => Some(Self::Curious),
            "frustrated" => Some(Self::Frustrated),
            "confused" => Some(Self::Confused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisQuality {
    Comprehensive,
    Good,
    Limited,
    #[default]
    Basic,
    Error,
}

impl AnalysisQuality {
    /// Grade a weighted quality score
    pub fn from_score(score: f64) -> Self {
        if score > 0.8 {
            Self::Comprehensive
        } else if score > 0.6 {
            Self::Good
        } else if score > 0.3 {
            Self::Limited
        } else {
            Self::Basic
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Good => "good",
            Self::Limited => "limited",
            Self::Basic => "basic",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AnalysisQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub symbol: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Percent change against the previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub technical_signals: Vec<String>,
    pub fundamental_factors: Vec<String>,
    pub sector_analysis: Vec<String>,
    pub market_trends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentReference {
    pub id: String,
    pub title: String,
    pub category: String,
    pub relevance: f64,
    pub key_excerpts: Vec<String>,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinancialContext {
    pub companies: Vec<CompanyInfo>,
    pub market_sentiment: Sentiment,
    pub risk_level: RiskLevel,
    pub confidence_score: f64,
    pub key_insights: Vec<String>,
    pub market_analysis: MarketAnalysis,
    pub documents_used: Vec<DocumentReference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub market: f64,
    pub documents: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    pub context_used: bool,
    pub market_data_used: bool,
    pub document_data_used: bool,
    pub analysis_quality: AnalysisQuality,
    pub confidence: ConfidenceReport,
}

/// The validated response object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub thinking: String,
    pub user_mood: UserMood,
    pub suggested_questions: Vec<String>,
    pub financial_context: FinancialContext,
    pub debug: DebugInfo,
}
