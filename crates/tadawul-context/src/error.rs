//! Error types for context fusion operations

use std::time::Duration;
use thiserror::Error;

/// Why an upstream fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The request was cancelled after the hard timeout
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Connection or transport failure
    #[error("network failure: {0}")]
    Network(String),

    /// Upstream asked us to slow down
    #[error("rate limited")]
    RateLimited,
}

/// Context engine errors
#[derive(Debug, Error)]
pub enum ContextError {
    /// Upstream market data could not be fetched
    #[error("Data fetch failed for {symbol}: {failure}")]
    DataFetch {
        symbol: String,
        failure: FetchFailure,
    },

    /// Upstream payload was malformed or missing required fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Final response failed the output contract
    #[error("Schema error: {0}")]
    Schema(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while loading documents
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Language model error
    #[error("Language model error: {0}")]
    Llm(#[from] tadawul_llm::LLMError),

    /// Prompt template error
    #[error("Template error: {0}")]
    Template(String),

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    Indicator(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ContextError {
    /// Shorthand for a fetch failure on `symbol`
    pub fn fetch(symbol: impl Into<String>, failure: FetchFailure) -> Self {
        Self::DataFetch {
            symbol: symbol.into(),
            failure,
        }
    }

    /// Whether the error came from an upstream data fetch
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, Self::DataFetch { .. } | Self::Network(_))
    }
}

/// Result type alias for context operations
pub type Result<T> = std::result::Result<T, ContextError>;

impl From<minijinja::Error> for ContextError {
    fn from(err: minijinja::Error) -> Self {
        ContextError::Template(err.to_string())
    }
}
