//! Configuration for the context engine

use crate::error::{ContextError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for context fusion operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Cache TTL for quotes
    pub quote_ttl: Duration,

    /// Cache TTL for key statistics (fundamentals)
    pub statistics_ttl: Duration,

    /// Cache TTL for daily price history
    pub history_ttl: Duration,

    /// Hard timeout for a single quote fetch
    pub quote_timeout: Duration,

    /// Timeout for other upstream HTTP requests
    pub request_timeout: Duration,

    /// Statistics requests allowed per minute
    pub statistics_rate_limit: u32,

    /// Maximum size of the active window; half of it is the message cap
    pub max_window_size: usize,

    /// Messages must score strictly above this to enter the window
    pub priority_threshold: f64,

    /// Market snapshots kept in the shared window
    pub max_snapshots: usize,

    /// Documents passed on to the fused context
    pub max_documents: usize,

    /// Results taken from each per-company or per-topic document lookup
    pub documents_per_lookup: usize,

    /// Model identifier for the language model
    pub model: String,

    /// Maximum tokens for model output
    pub max_tokens: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Optional document manifest loaded at startup
    pub document_manifest: Option<PathBuf>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(10),
            statistics_ttl: Duration::from_secs(300),
            history_ttl: Duration::from_secs(300),
            quote_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            statistics_rate_limit: 60,
            max_window_size: 10,
            priority_threshold: 0.7,
            max_snapshots: 20,
            max_documents: 5,
            documents_per_lookup: 3,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1500,
            temperature: 0.3,
            document_manifest: None,
        }
    }
}

impl ContextConfig {
    /// Create a new configuration builder
    pub fn builder() -> ContextConfigBuilder {
        ContextConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.quote_ttl.is_zero() || self.statistics_ttl.is_zero() || self.history_ttl.is_zero()
        {
            return Err(ContextError::Config(
                "cache TTLs must be greater than zero".to_string(),
            ));
        }

        if self.quote_timeout.is_zero() {
            return Err(ContextError::Config(
                "quote_timeout must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.priority_threshold) {
            return Err(ContextError::Config(format!(
                "priority_threshold must be within [0, 1], got {}",
                self.priority_threshold
            )));
        }

        if self.max_window_size == 0 {
            return Err(ContextError::Config(
                "max_window_size must be greater than 0".to_string(),
            ));
        }

        if self.statistics_rate_limit == 0 {
            return Err(ContextError::Config(
                "statistics_rate_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for ContextConfig
#[derive(Debug, Default)]
pub struct ContextConfigBuilder {
    quote_ttl: Option<Duration>,
    statistics_ttl: Option<Duration>,
    history_ttl: Option<Duration>,
    quote_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    statistics_rate_limit: Option<u32>,
    max_window_size: Option<usize>,
    priority_threshold: Option<f64>,
    max_snapshots: Option<usize>,
    max_documents: Option<usize>,
    documents_per_lookup: Option<usize>,
    model: Option<String>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    document_manifest: Option<PathBuf>,
}

impl ContextConfigBuilder {
    /// Set quote cache TTL
    pub fn quote_ttl(mut self, ttl: Duration) -> Self {
        self.quote_ttl = Some(ttl);
        self
    }

    /// Set statistics cache TTL
    pub fn statistics_ttl(mut self, ttl: Duration) -> Self {
        self.statistics_ttl = Some(ttl);
        self
    }

    /// Set price history cache TTL
    pub fn history_ttl(mut self, ttl: Duration) -> Self {
        self.history_ttl = Some(ttl);
        self
    }

    /// Set the hard quote timeout
    pub fn quote_timeout(mut self, timeout: Duration) -> Self {
        self.quote_timeout = Some(timeout);
        self
    }

    /// Set the HTTP request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set statistics requests per minute
    pub fn statistics_rate_limit(mut self, per_minute: u32) -> Self {
        self.statistics_rate_limit = Some(per_minute);
        self
    }

    /// Set the active window size
    pub fn max_window_size(mut self, size: usize) -> Self {
        self.max_window_size = Some(size);
        self
    }

    /// Set the window priority threshold
    pub fn priority_threshold(mut self, threshold: f64) -> Self {
        self.priority_threshold = Some(threshold);
        self
    }

    /// Set the snapshot cap
    pub fn max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = Some(max);
        self
    }

    /// Set the fused document cap
    pub fn max_documents(mut self, max: usize) -> Self {
        self.max_documents = Some(max);
        self
    }

    /// Set results per document lookup
    pub fn documents_per_lookup(mut self, n: usize) -> Self {
        self.documents_per_lookup = Some(n);
        self
    }

    /// Set the model identifier
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max output tokens
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set sampling temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the document manifest path
    pub fn document_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.document_manifest = Some(path.into());
        self
    }

    /// Apply `TADAWUL_MODEL`, `TADAWUL_DOCUMENTS` and `TADAWUL_QUOTE_TIMEOUT_MS`
    pub fn with_env(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("TADAWUL_MODEL") {
            self.model = Some(model);
        }
        if let Some(path) = lookup("TADAWUL_DOCUMENTS") {
            self.document_manifest = Some(PathBuf::from(path));
        }
        if let Some(ms) = lookup("TADAWUL_QUOTE_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok())
        {
            self.quote_timeout = Some(Duration::from_millis(ms));
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ContextConfig> {
        let defaults = ContextConfig::default();

        let config = ContextConfig {
            quote_ttl: self.quote_ttl.unwrap_or(defaults.quote_ttl),
            statistics_ttl: self.statistics_ttl.unwrap_or(defaults.statistics_ttl),
            history_ttl: self.history_ttl.unwrap_or(defaults.history_ttl),
            quote_timeout: self.quote_timeout.unwrap_or(defaults.quote_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            statistics_rate_limit: self
                .statistics_rate_limit
                .unwrap_or(defaults.statistics_rate_limit),
            max_window_size: self.max_window_size.unwrap_or(defaults.max_window_size),
            priority_threshold: self.priority_threshold.unwrap_or(defaults.priority_threshold),
            max_snapshots: self.max_snapshots.unwrap_or(defaults.max_snapshots),
            max_documents: self.max_documents.unwrap_or(defaults.max_documents),
            documents_per_lookup: self
                .documents_per_lookup
                .unwrap_or(defaults.documents_per_lookup),
            model: self.model.unwrap_or(defaults.model),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            document_manifest: self.document_manifest,
        };

        config.validate()?;
        Ok(config)
    }
}
