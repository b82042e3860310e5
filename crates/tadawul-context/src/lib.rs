//! Context fusion for Saudi-market (Tadawul) equity questions
//!
//! For each chat message the engine:
//!
//! - Recognises companies, sectors, indicators and sentiment in the text
//!   (English and Arabic vocabularies over a gazetteer of listed companies)
//! - Keeps a priority-scored window over the conversation history
//! - Fetches quotes, key statistics and technical signals through TTL caches,
//!   with a hard timeout on quotes
//! - Retrieves ranked documents from an in-memory corpus
//! - Fuses everything into confidence scores, a risk grade, insights and
//!   follow-up questions
//! - Asks a language model for the answer and validates the final response
//!   against a fixed output contract
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tadawul_context::{ChatService, ContextConfig, DocumentStore, Gazetteer, Message};
//! use tadawul_context::api::YahooFinanceClient;
//! use tadawul_llm::providers::OpenAIProvider;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ContextConfig::builder().with_env().build()?;
//!     let service = ChatService::new(
//!         config.clone(),
//!         Arc::new(Gazetteer::tadawul()),
//!         Arc::new(YahooFinanceClient::new(&config)?),
//!         Arc::new(OpenAIProvider::from_env()?),
//!         DocumentStore::new(),
//!     )?;
//!
//!     let outcome = service
//!         .handle("demo", vec![Message::user("How is Aramco doing today?")])
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&outcome.response)?);
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod documents;
pub mod error;
pub mod fusion;
pub mod gazetteer;
pub mod market;
pub mod prompts;
pub mod response;
pub mod service;

pub use analyzer::{CompanyMatch, EntityAnalyzer, RiskLevel, Sentiment, TextAnalysis};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ContextConfig, ContextConfigBuilder};
pub use conversation::{ContextWindowManager, FinancialMetadata, Message, MessageRole};
pub use documents::{
    DocumentCategory, DocumentLoader, DocumentQuery, DocumentSearchResult, DocumentStore,
    FinancialDocument, Language,
};
pub use error::{ContextError, FetchFailure, Result};
pub use fusion::{ContextFusion, FusedContext, RiskFlag};
pub use gazetteer::{Gazetteer, Instrument};
pub use market::{MarketDataProvider, MarketDataService};
pub use response::{ChatResponse, ResponseAssembler, ResponseStatus};
pub use service::{ChatOutcome, ChatService};
