//! Conversation history and the context window

mod context;
mod manager;
mod message;

pub use context::{
    ContextWindow, ConversationContext, MarketContext, MarketSnapshot, MessageScore,
    ScoredMessage, VolatilityLevel,
};
pub use manager::ContextWindowManager;
pub use message::{FinancialMetadata, Message, MessageRole};
