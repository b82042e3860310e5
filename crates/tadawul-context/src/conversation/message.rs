//! Chat messages and the financial metadata attached to them

use crate::analyzer::{RiskLevel, Sentiment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// What the analyzer found in a message. Empty lists mean "not present".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialMetadata {
    #[serde(default)]
    pub instruments: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub markets: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub timeframes: Vec<String>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub technical_indicators: Vec<String>,
    #[serde(default)]
    pub fundamental_factors: Vec<String>,
}

impl FinancialMetadata {
    pub fn has_instruments(&self) -> bool {
        !self.instruments.is_empty()
    }

    pub fn has_markets(&self) -> bool {
        !self.markets.is_empty()
    }

    pub fn has_technical(&self) -> bool {
        !self.technical_indicators.is_empty()
    }

    pub fn has_fundamental(&self) -> bool {
        !self.fundamental_factors.is_empty()
    }

    /// One line per field that carries a value
    pub fn insight_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut list = |label: &str, values: &[String]| {
            if !values.is_empty() {
                lines.push(format!("{label}: {}", values.join(", ")));
            }
        };

        list("Instruments discussed", &self.instruments);
        list("Companies discussed", &self.companies);
        list("Markets", &self.markets);
        list("Metrics of interest", &self.metrics);
        list("Timeframes", &self.timeframes);
        list("Technical indicators", &self.technical_indicators);
        list("Fundamental factors", &self.fundamental_factors);

        if let Some(sentiment) = self.sentiment {
            lines.push(format!("Sentiment: {sentiment}"));
        }
        if let Some(risk) = self.risk_level {
            lines.push(format!("Risk level: {risk}"));
        }
        if let Some(confidence) = self.confidence_score {
            lines.push(format!("Analysis confidence: {confidence:.2}"));
        }
        lines
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<FinancialMetadata>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: FinancialMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn metadata(&self) -> Option<&FinancialMetadata> {
        self.metadata.as_ref()
    }
}
