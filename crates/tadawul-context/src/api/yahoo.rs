//! Yahoo Finance client for Tadawul listings

use crate::config::ContextConfig;
use crate::error::{ContextError, FetchFailure, Result};
use crate::market::{KeyStatistics, MarketDataProvider, PriceBar, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

const SUMMARY_BASE_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";
const SUMMARY_MODULES: &str = "summaryDetail,financialData,defaultKeyStatistics";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Yahoo Finance client: chart API for prices, quoteSummary for fundamentals
#[derive(Clone)]
pub struct YahooFinanceClient {
    connector: Arc<yahoo::YahooConnector>,
    http: Client,
    rate_limiter: SharedRateLimiter,
}

// quoteSummary payload; every level may be missing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    #[serde(default)]
    quote_summary: Option<SummaryBody>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
    #[serde(default)]
    error: Option<SummaryError>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    summary_detail: Option<SummaryDetail>,
    #[serde(default)]
    financial_data: Option<FinancialData>,
    #[serde(default)]
    default_key_statistics: Option<DefaultKeyStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(default, rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    #[serde(default)]
    market_cap: Option<RawValue>,
    #[serde(default)]
    dividend_yield: Option<RawValue>,
    #[serde(default)]
    beta: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    #[serde(default)]
    profit_margins: Option<RawValue>,
    #[serde(default)]
    debt_to_equity: Option<RawValue>,
    #[serde(default)]
    revenue_growth: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultKeyStatistics {
    #[serde(default)]
    trailing_eps: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<f64>,
}

fn raw(value: Option<&RawValue>) -> Option<f64> {
    value.and_then(|v| v.raw).filter(|v| v.is_finite())
}

impl YahooFinanceClient {
    /// Create a client with the configured request timeout and rate limit
    pub fn new(config: &ContextConfig) -> Result<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| ContextError::Config(format!("Yahoo connector: {e}")))?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("Mozilla/5.0 (compatible; tadawul-context)")
            .build()?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.statistics_rate_limit).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            connector: Arc::new(connector),
            http,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn bars(&self, symbol: &str, range: &str) -> Result<Vec<PriceBar>> {
        let response = self
            .connector
            .get_quote_range(symbol, "1d", range)
            .await
            .map_err(|e| ContextError::fetch(symbol, FetchFailure::Network(e.to_string())))?;

        let quotes = response
            .quotes()
            .map_err(|e| ContextError::Validation(format!("{symbol}: {e}")))?;

        Ok(quotes
            .iter()
            .map(|q| PriceBar {
                timestamp: DateTime::from_timestamp(q.timestamp as i64, 0).unwrap_or_else(Utc::now),
                open: q.open,
                high: q.high,
                low: q.low,
                close: q.close,
                volume: q.volume,
            })
            .collect())
    }
}

/// Latest bar against the one before it
pub(crate) fn quote_from_bars(symbol: &str, bars: &[PriceBar]) -> Result<Quote> {
    let Some(last) = bars.iter().rev().find(|b| b.close.is_finite() && b.close > 0.0) else {
        return Err(ContextError::Validation(format!("{symbol}: no usable quotes")));
    };

    let previous_close = bars
        .iter()
        .rev()
        .filter(|b| b.timestamp < last.timestamp && b.close.is_finite() && b.close > 0.0)
        .map(|b| b.close)
        .next()
        .unwrap_or(last.close);

    let change = last.close - previous_close;
    Ok(Quote {
        symbol: symbol.to_string(),
        price: last.close,
        previous_close,
        change,
        change_percent: change / previous_close * 100.0,
        volume: last.volume,
        timestamp: last.timestamp,
    })
}

/// Map a quoteSummary body onto [`KeyStatistics`]
pub(crate) fn parse_statistics(symbol: &str, body: &str) -> Result<KeyStatistics> {
    let envelope: SummaryEnvelope = serde_json::from_str(body)
        .map_err(|e| ContextError::Validation(format!("{symbol}: malformed quoteSummary: {e}")))?;

    let summary = envelope.quote_summary.unwrap_or_default();
    if let Some(description) = summary.error.and_then(|e| e.description) {
        return Err(ContextError::Validation(format!("{symbol}: {description}")));
    }

    let Some(result) = summary.result.and_then(|r| r.into_iter().next()) else {
        return Err(ContextError::Validation(format!(
            "{symbol}: quoteSummary has no result"
        )));
    };

    let detail = result.summary_detail.unwrap_or_default();
    let financial = result.financial_data.unwrap_or_default();
    let key_stats = result.default_key_statistics.unwrap_or_default();

    Ok(KeyStatistics {
        pe_ratio: raw(detail.trailing_pe.as_ref()),
        profit_margin: raw(financial.profit_margins.as_ref()),
        // Yahoo reports debt/equity as a percentage
        debt_to_equity: raw(financial.debt_to_equity.as_ref()).map(|v| v / 100.0),
        market_cap: raw(detail.market_cap.as_ref()),
        dividend_yield: raw(detail.dividend_yield.as_ref()),
        eps: raw(key_stats.trailing_eps.as_ref()),
        beta: raw(detail.beta.as_ref()),
        revenue_growth: raw(financial.revenue_growth.as_ref()),
    })
}

fn status_failure(status: StatusCode) -> FetchFailure {
    if status == StatusCode::TOO_MANY_REQUESTS {
        FetchFailure::RateLimited
    } else {
        FetchFailure::Status(status.as_u16())
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    #[instrument(skip(self))]
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let bars = self.bars(symbol, "5d").await?;
        quote_from_bars(symbol, &bars)
    }

    #[instrument(skip(self))]
    async fn statistics(&self, symbol: &str) -> Result<KeyStatistics> {
        self.rate_limiter.until_ready().await;

        let url = format!("{SUMMARY_BASE_URL}/{symbol}");
        let response = self
            .http
            .get(&url)
            .query(&[("modules", SUMMARY_MODULES)])
            .send()
            .await
            .map_err(|e| ContextError::fetch(symbol, FetchFailure::Network(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContextError::fetch(symbol, status_failure(status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ContextError::fetch(symbol, FetchFailure::Network(e.to_string())))?;
        debug!(symbol, bytes = body.len(), "quoteSummary received");

        parse_statistics(symbol, &body)
    }

    #[instrument(skip(self))]
    async fn history(&self, symbol: &str) -> Result<Vec<PriceBar>> {
        self.bars(symbol, "6mo").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bar(days_ago: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc::now() - Duration::days(days_ago),
            open: close,
            high: close,
            low: close,
            close,
            volume: 500,
        }
    }

    #[test]
    fn test_quote_from_bars() {
        let quote = quote_from_bars("2222.SR", &[bar(2, 25.0), bar(1, 26.0), bar(0, 27.3)]).unwrap();
        assert!((quote.price - 27.3).abs() < 1e-9);
        assert!((quote.previous_close - 26.0).abs() < 1e-9);
        assert!((quote.change_percent - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_quote_from_single_bar_has_no_change() {
        let quote = quote_from_bars("2222.SR", &[bar(0, 27.3)]).unwrap();
        assert!(quote.change.abs() < 1e-9);
        assert!(quote_from_bars("2222.SR", &[]).is_err());
    }

    #[test]
    fn test_parse_statistics() {
        let body = r#"{"quoteSummary":{"result":[{
            "summaryDetail":{"trailingPE":{"raw":16.4,"fmt":"16.40"},"marketCap":{"raw":6.9e12},
                             "dividendYield":{"raw":0.055},"beta":{}},
            "financialData":{"profitMargins":{"raw":0.24},"debtToEquity":{"raw":15.0}},
            "defaultKeyStatistics":{"trailingEps":{"raw":1.87}}
        }],"error":null}}"#;

        let stats = parse_statistics("2222.SR", body).unwrap();
        assert_eq!(stats.pe_ratio, Some(16.4));
        assert_eq!(stats.debt_to_equity, Some(0.15));
        assert_eq!(stats.beta, None);
        assert_eq!(stats.revenue_growth, None);
        assert_eq!(stats.eps, Some(1.87));
    }

    #[test]
    fn test_parse_statistics_errors() {
        let missing = parse_statistics("X", r#"{"quoteSummary":{"result":[]}}"#);
        assert!(matches!(missing, Err(ContextError::Validation(_))));

        let upstream = parse_statistics(
            "X",
            r#"{"quoteSummary":{"result":null,"error":{"code":"Not Found","description":"Quote not found for ticker symbol: X"}}}"#,
        );
        assert!(matches!(upstream, Err(ContextError::Validation(m)) if m.contains("not found")));

        assert!(parse_statistics("X", "<html>").is_err());
    }

    #[test]
    fn test_status_failure() {
        assert_eq!(status_failure(StatusCode::TOO_MANY_REQUESTS), FetchFailure::RateLimited);
        assert_eq!(status_failure(StatusCode::NOT_FOUND), FetchFailure::Status(404));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_live_quote() {
        let client = YahooFinanceClient::new(&ContextConfig::default()).unwrap();
        let quote = client.quote("2222.SR").await.unwrap();
        assert!(quote.price > 0.0);
    }
}
