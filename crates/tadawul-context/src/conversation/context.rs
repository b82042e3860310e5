//! Conversation state, the shared active window and market context

use super::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Running state for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: String,
    pub messages: Vec<Message>,
    pub active_instruments: BTreeSet<String>,
    pub technical_analysis_active: bool,
    pub fundamental_analysis_active: bool,
    /// Most recently named instrument, used to resolve follow-ups
    pub current_company: Option<String>,
    pub last_updated: DateTime<Utc>,
    pub user_preferences: HashMap<String, String>,
}

impl ConversationContext {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            active_instruments: BTreeSet::new(),
            technical_analysis_active: false,
            fundamental_analysis_active: false,
            current_company: None,
            last_updated: now,
            user_preferences: HashMap::new(),
        }
    }

    pub fn contains_message(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityLevel {
    Low,
    #[default]
    Normal,
    High,
}

/// Exchange-wide conditions shared by every conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub market_hours: bool,
    pub conditions: String,
    pub volatility_level: VolatilityLevel,
    pub major_indices: BTreeMap<String, f64>,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            market_hours: false,
            conditions: "normal".to_string(),
            volatility_level: VolatilityLevel::Normal,
            major_indices: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub taken_at: DateTime<Utc>,
    pub context: MarketContext,
}

/// Score components for one message
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MessageScore {
    pub market_relevance: f64,
    pub time_relevance: f64,
    pub instrument_relevance: f64,
    pub user_priority: f64,
    pub final_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMessage {
    pub message: Message,
    pub score: MessageScore,
}

/// Highest-priority recent messages plus derived snapshots and insights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub max_size: usize,
    pub priority_threshold: f64,
    pub recent_messages: Vec<ScoredMessage>,
    pub market_snapshots: Vec<MarketSnapshot>,
    pub key_insights: Vec<String>,
}

impl ContextWindow {
    pub fn new(max_size: usize, priority_threshold: f64) -> Self {
        Self {
            max_size,
            priority_threshold,
            recent_messages: Vec::new(),
            market_snapshots: Vec::new(),
            key_insights: Vec::new(),
        }
    }

    /// Messages the window may hold
    pub fn message_cap(&self) -> usize {
        self.max_size / 2
    }
}
