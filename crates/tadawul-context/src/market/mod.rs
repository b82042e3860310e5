//! Market data: upstream provider seam, cached access and technical signals

pub mod technical;

use crate::cache::TtlCache;
use crate::config::ContextConfig;
use crate::error::{ContextError, FetchFailure, Result};
use crate::gazetteer::Instrument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Latest trade data for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// Fundamentals; every field may be missing upstream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyStatistics {
    pub pe_ratio: Option<f64>,
    /// Fraction, e.g. 0.25 for 25%
    pub profit_margin: Option<f64>,
    /// Ratio, e.g. 1.5 means debt is 150% of equity
    pub debt_to_equity: Option<f64>,
    pub market_cap: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub eps: Option<f64>,
    pub beta: Option<f64>,
    pub revenue_growth: Option<f64>,
}

impl KeyStatistics {
    /// Share of the tracked fields that are present
    pub fn completeness(&self) -> f64 {
        let fields = [
            self.pe_ratio,
            self.profit_margin,
            self.debt_to_equity,
            self.market_cap,
            self.dividend_yield,
            self.eps,
            self.beta,
            self.revenue_growth,
        ];
        fields.iter().filter(|f| f.is_some()).count() as f64 / fields.len() as f64
    }
}

/// One daily bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSignal {
    pub indicator: String,
    pub direction: SignalDirection,
    /// In [0, 1]
    pub strength: f64,
    pub value: f64,
    pub description: String,
}

/// Everything fetched for one company; absent parts degraded to `None`/empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyMarketData {
    pub instrument: Instrument,
    pub quote: Quote,
    pub statistics: Option<KeyStatistics>,
    pub signals: Vec<TechnicalSignal>,
}

/// Upstream quote and fundamentals source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn quote(&self, symbol: &str) -> Result<Quote>;

    async fn statistics(&self, symbol: &str) -> Result<KeyStatistics>;

    /// Daily bars, oldest first
    async fn history(&self, symbol: &str) -> Result<Vec<PriceBar>>;
}

/// Cached, timeout-bounded access to a [`MarketDataProvider`]
#[derive(Clone)]
pub struct MarketDataService {
    provider: Arc<dyn MarketDataProvider>,
    quotes: TtlCache<String, Quote>,
    statistics: TtlCache<String, KeyStatistics>,
    history: TtlCache<String, Vec<PriceBar>>,
    quote_timeout: Duration,
}

impl MarketDataService {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: &ContextConfig) -> Self {
        Self {
            provider,
            quotes: TtlCache::new("quotes", config.quote_ttl),
            statistics: TtlCache::new("statistics", config.statistics_ttl),
            history: TtlCache::new("history", config.history_ttl),
            quote_timeout: config.quote_timeout,
        }
    }

    /// Quote, cancelled if the provider takes longer than the quote timeout
    #[instrument(skip(self))]
    pub async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let provider = Arc::clone(&self.provider);
        let timeout = self.quote_timeout;
        self.quotes
            .get_or_fetch(symbol.to_string(), || async move {
                match tokio::time::timeout(timeout, provider.quote(symbol)).await {
                    Ok(result) => result,
                    Err(_) => Err(ContextError::fetch(symbol, FetchFailure::Timeout(timeout))),
                }
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_statistics(&self, symbol: &str) -> Result<KeyStatistics> {
        let provider = Arc::clone(&self.provider);
        self.statistics
            .get_or_fetch(symbol.to_string(), || async move { provider.statistics(symbol).await })
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_history(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        let provider = Arc::clone(&self.provider);
        self.history
            .get_or_fetch(symbol.to_string(), || async move { provider.history(symbol).await })
            .await
    }

    pub async fn technical_signals(&self, symbol: &str) -> Result<Vec<TechnicalSignal>> {
        let bars = self.get_history(symbol).await?;
        technical::compute_signals(&bars)
    }

    /// Quote, statistics and signals for one company.
    ///
    /// A failed quote drops the company (`None`); failed statistics or
    /// history only drop that part.
    pub async fn company_data(&self, instrument: &Instrument) -> Option<CompanyMarketData> {
        let symbol = instrument.yahoo_symbol();

        let (quote, statistics, signals) = tokio::join!(
            self.get_quote(&symbol),
            self.get_statistics(&symbol),
            self.technical_signals(&symbol)
        );

        let quote = match quote {
            Ok(quote) => quote,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "quote unavailable, omitting company");
                return None;
            }
        };

        let statistics = statistics
            .inspect_err(|e| warn!(symbol = %symbol, error = %e, "statistics unavailable"))
            .ok();
        let signals = signals
            .inspect_err(|e| warn!(symbol = %symbol, error = %e, "technical signals unavailable"))
            .unwrap_or_default();

        debug!(
            symbol = %symbol,
            has_statistics = statistics.is_some(),
            signals = signals.len(),
            "company market data ready"
        );

        Some(CompanyMarketData {
            instrument: instrument.clone(),
            quote,
            statistics,
            signals,
        })
    }
}
