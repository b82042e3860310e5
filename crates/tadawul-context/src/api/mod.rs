//! Upstream market data clients

pub mod yahoo;

pub use yahoo::YahooFinanceClient;
