//! Priority-scored sliding window over conversation history

use super::context::{
    ContextWindow, ConversationContext, MarketContext, MarketSnapshot, MessageScore,
    ScoredMessage, VolatilityLevel,
};
use super::message::Message;
use crate::analyzer::RiskLevel;
use crate::clock::{Clock, SystemClock};
use crate::config::ContextConfig;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

const MARKET_WEIGHT: f64 = 0.3;
const TIME_WEIGHT: f64 = 0.2;
const INSTRUMENT_WEIGHT: f64 = 0.3;
const USER_PRIORITY_WEIGHT: f64 = 0.2;

/// Time relevance decays by 1/e per hour
const TIME_DECAY_SECS: f64 = 3600.0;

/// Messages whose metadata feeds the key insights
const INSIGHT_SOURCE_MESSAGES: usize = 5;

/// Draw that must be exceeded for a volatility-triggered snapshot
const SNAPSHOT_DRAW_THRESHOLD: f64 = 0.7;

/// Owns every conversation and its window. Market snapshots and the market
/// context are shared by all conversations.
pub struct ContextWindowManager {
    conversations: HashMap<String, ConversationContext>,
    windows: HashMap<String, ContextWindow>,
    /// Size and threshold every new window starts from
    template: ContextWindow,
    snapshots: Vec<MarketSnapshot>,
    market: MarketContext,
    max_snapshots: usize,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send + Sync>,
}

impl ContextWindowManager {
    /// Manager on the wall clock with an entropy-seeded RNG
    pub fn new(config: &ContextConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(SystemClock),
            Box::new(StdRng::from_entropy()),
        )
    }

    /// Manager with an injected clock and random source
    pub fn with_parts(
        config: &ContextConfig,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RngCore + Send + Sync>,
    ) -> Self {
        Self {
            conversations: HashMap::new(),
            windows: HashMap::new(),
            template: ContextWindow::new(config.max_window_size, config.priority_threshold),
            snapshots: Vec::new(),
            market: MarketContext::default(),
            max_snapshots: config.max_snapshots,
            clock,
            rng,
        }
    }

    /// Append a message, creating the conversation on first use, and
    /// recompute that conversation's window
    pub fn add_message(&mut self, conversation_id: &str, message: Message) -> &ContextWindow {
        let now = self.clock.now();
        let mentions_market = message.metadata().is_some_and(|m| m.has_markets());

        {
            let conversation = self
                .conversations
                .entry(conversation_id.to_string())
                .or_insert_with(|| {
                    debug!(conversation_id, "conversation created");
                    ConversationContext::new(conversation_id, now)
                });

            if let Some(metadata) = message.metadata() {
                conversation
                    .active_instruments
                    .extend(metadata.instruments.iter().cloned());
                conversation.technical_analysis_active |= metadata.has_technical();
                conversation.fundamental_analysis_active |= metadata.has_fundamental();
                if let Some(first) = metadata.instruments.first() {
                    conversation.current_company = Some(first.clone());
                }
            }

            conversation.messages.push(message);
            conversation.last_updated = now;
        }

        self.maybe_snapshot(mentions_market, now);
        self.recompute_window(conversation_id, now)
    }

    /// Whether a conversation already holds a message id
    pub fn contains_message(&self, conversation_id: &str, message_id: &str) -> bool {
        self.conversations
            .get(conversation_id)
            .is_some_and(|c| c.contains_message(message_id))
    }

    /// Score a message against the current clock and tracked instruments
    pub fn score_message(&self, message: &Message) -> MessageScore {
        self.score_at(message, self.clock.now())
    }

    fn score_at(&self, message: &Message, now: DateTime<Utc>) -> MessageScore {
        let metadata = message.metadata();

        let market_relevance = 0.5
            + metadata.map_or(0.0, |m| {
                [
                    m.has_instruments(),
                    m.has_markets(),
                    m.has_technical(),
                    m.has_fundamental(),
                ]
                .iter()
                .filter(|present| **present)
                .count() as f64
                    * 0.1
            });

        let age_secs = (now - message.timestamp).num_milliseconds().max(0) as f64 / 1000.0;
        let time_relevance = (-age_secs / TIME_DECAY_SECS).exp();

        let instrument_relevance = match metadata {
            Some(m) if m.has_instruments() => {
                if m.instruments.iter().any(|i| self.is_active_instrument(i)) {
                    0.9
                } else {
                    0.7
                }
            }
            _ => 0.5,
        };

        let mut user_priority = 0.5;
        if let Some(m) = metadata {
            if m.risk_level == Some(RiskLevel::High) {
                user_priority += 0.2;
            }
            if m.confidence_score.is_some_and(|c| c > 0.8) {
                user_priority += 0.1;
            }
        }

        let final_score = MARKET_WEIGHT * market_relevance
            + TIME_WEIGHT * time_relevance
            + INSTRUMENT_WEIGHT * instrument_relevance
            + USER_PRIORITY_WEIGHT * user_priority;

        MessageScore {
            market_relevance,
            time_relevance,
            instrument_relevance,
            user_priority,
            final_score,
        }
    }

    fn is_active_instrument(&self, symbol: &str) -> bool {
        self.conversations
            .values()
            .any(|c| c.active_instruments.contains(symbol))
    }

    /// Every message of a conversation, highest score first
    fn ranked(&self, conversation_id: &str, now: DateTime<Utc>) -> Vec<ScoredMessage> {
        let Some(conversation) = self.conversations.get(conversation_id) else {
            return Vec::new();
        };

        let mut scored: Vec<ScoredMessage> = conversation
            .messages
            .iter()
            .map(|message| ScoredMessage {
                score: self.score_at(message, now),
                message: message.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.final_score.total_cmp(&a.score.final_score));
        scored
    }

    fn select_window(&self, ranked: &[ScoredMessage]) -> Vec<ScoredMessage> {
        ranked
            .iter()
            .filter(|m| m.score.final_score > self.template.priority_threshold)
            .take(self.template.message_cap())
            .cloned()
            .collect()
    }

    fn insights(ranked: &[ScoredMessage]) -> Vec<String> {
        let mut insights: Vec<String> = Vec::new();
        for line in ranked
            .iter()
            .take(INSIGHT_SOURCE_MESSAGES)
            .filter_map(|m| m.message.metadata())
            .flat_map(super::message::FinancialMetadata::insight_lines)
        {
            if !insights.contains(&line) {
                insights.push(line);
            }
        }
        insights
    }

    fn recompute_window(&mut self, conversation_id: &str, now: DateTime<Utc>) -> &ContextWindow {
        let ranked = self.ranked(conversation_id, now);
        let recent = self.select_window(&ranked);
        let insights = Self::insights(&ranked);

        debug!(
            conversation_id,
            scored = ranked.len(),
            kept = recent.len(),
            insights = insights.len(),
            "window recomputed"
        );

        let window = self
            .windows
            .entry(conversation_id.to_string())
            .or_insert_with(|| self.template.clone());
        window.recent_messages = recent;
        window.key_insights = insights;
        window.market_snapshots.clone_from(&self.snapshots);
        window
    }

    fn maybe_snapshot(&mut self, mentions_market: bool, now: DateTime<Utc>) {
        let triggered = mentions_market
            || (self.market.volatility_level == VolatilityLevel::High
                && self.rng.gen_range(0.0..1.0) > SNAPSHOT_DRAW_THRESHOLD);

        if !triggered {
            return;
        }

        self.snapshots.push(MarketSnapshot {
            taken_at: now,
            context: self.market.clone(),
        });

        let overflow = self.snapshots.len().saturating_sub(self.max_snapshots);
        if overflow > 0 {
            self.snapshots.drain(..overflow);
        }
        debug!(
            snapshots = self.snapshots.len(),
            "market snapshot taken"
        );
    }

    /// Replace the shared market context
    pub fn update_market_context(&mut self, context: MarketContext) {
        self.market = context;
    }

    pub fn market_context(&self) -> &MarketContext {
        &self.market
    }

    /// A conversation's window as of its last `add_message`
    pub fn window(&self, conversation_id: &str) -> Option<&ContextWindow> {
        self.windows.get(conversation_id)
    }

    /// Snapshots shared by every conversation, oldest first
    pub fn market_snapshots(&self) -> &[MarketSnapshot] {
        &self.snapshots
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&ConversationContext> {
        self.conversations.get(conversation_id)
    }

    /// Instrument carried over for follow-up questions
    pub fn current_company(&self, conversation_id: &str) -> Option<&str> {
        self.conversations
            .get(conversation_id)
            .and_then(|c| c.current_company.as_deref())
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Render snapshots, insights and the conversation's top messages as one
    /// block of prompt text. Unknown conversations render as "".
    pub fn get_context_for_prompt(&self, conversation_id: &str) -> String {
        if !self.conversations.contains_key(conversation_id) {
            return String::new();
        }

        let ranked = self.ranked(conversation_id, self.clock.now());
        let recent = self.select_window(&ranked);
        let insights = Self::insights(&ranked);

        let mut out = String::new();

        if !self.snapshots.is_empty() {
            out.push_str("Market snapshots:\n");
            for snapshot in &self.snapshots {
                let _ = write!(
                    out,
                    "- {} | {} | volatility {:?}",
                    snapshot.taken_at.format("%Y-%m-%d %H:%M UTC"),
                    snapshot.context.conditions,
                    snapshot.context.volatility_level
                );
                for (index, level) in &snapshot.context.major_indices {
                    let _ = write!(out, " | {index} {level:.2}");
                }
                out.push('\n');
            }
        }

        if !insights.is_empty() {
            out.push_str("Key insights:\n");
            for insight in &insights {
                let _ = writeln!(out, "- {insight}");
            }
        }

        if !recent.is_empty() {
            out.push_str("Relevant conversation:\n");
            for scored in &recent {
                let _ = writeln!(
                    out,
                    "- [{} {:.2}] {}",
                    scored.message.role.as_str(),
                    scored.score.final_score,
                    scored.message.content
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::conversation::FinancialMetadata;
    use chrono::Duration;
    use rand::rngs::mock::StepRng;

    fn manager_with(
        config: &ContextConfig,
        clock: Arc<ManualClock>,
        rng: StepRng,
    ) -> ContextWindowManager {
        ContextWindowManager::with_parts(config, clock, Box::new(rng))
    }

    fn instrument_metadata(symbol: &str) -> FinancialMetadata {
        FinancialMetadata {
            instruments: vec![symbol.to_string()],
            markets: vec!["Tadawul".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_score_components() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        let plain = Message::user("hello").with_timestamp(now);
        let score = manager.score_message(&plain);
        assert!((score.market_relevance - 0.5).abs() < 1e-9);
        assert!((score.time_relevance - 1.0).abs() < 1e-9);
        assert!((score.instrument_relevance - 0.5).abs() < 1e-9);
        assert!((score.final_score - 0.6).abs() < 1e-9);

        let flagged = Message::user("risky")
            .with_timestamp(now - Duration::hours(1))
            .with_metadata(FinancialMetadata {
                instruments: vec!["2222".to_string()],
                technical_indicators: vec!["RSI".to_string()],
                risk_level: Some(RiskLevel::High),
                confidence_score: Some(0.9),
                ..Default::default()
            });
        let score = manager.score_message(&flagged);
        assert!((score.market_relevance - 0.7).abs() < 1e-9);
        assert!((score.time_relevance - (-1.0f64).exp()).abs() < 1e-9);
        // not active anywhere yet
        assert!((score.instrument_relevance - 0.7).abs() < 1e-9);
        assert!((score.user_priority - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_conversation_created_lazily() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        assert!(manager.conversation("c1").is_none());
        assert_eq!(manager.get_context_for_prompt("c1"), "");

        manager.add_message(
            "c1",
            Message::user("Aramco?").with_metadata(FinancialMetadata {
                instruments: vec!["2222".to_string()],
                technical_indicators: vec!["RSI".to_string()],
                ..Default::default()
            }),
        );

        let conversation = manager.conversation("c1").unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert!(conversation.active_instruments.contains("2222"));
        assert!(conversation.technical_analysis_active);
        assert!(!conversation.fundamental_analysis_active);
        assert_eq!(manager.current_company("c1"), Some("2222"));
        assert_eq!(manager.conversation_count(), 1);
    }

    #[test]
    fn test_window_keeps_only_high_priority_messages() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        for i in 0..7 {
            manager.add_message("c1", Message::user(format!("filler {i}")).with_timestamp(now));
        }

        let mut plain = instrument_metadata("1120");
        plain.confidence_score = Some(0.5);
        let mut confident = instrument_metadata("2010");
        confident.confidence_score = Some(0.9);
        let mut risky = instrument_metadata("2222");
        risky.risk_level = Some(RiskLevel::High);

        manager.add_message("c1", Message::user("plain one").with_timestamp(now).with_metadata(plain));
        manager.add_message(
            "c1",
            Message::user("confident one").with_timestamp(now).with_metadata(confident),
        );
        manager.add_message("c1", Message::user("risky one").with_timestamp(now).with_metadata(risky));

        let window = manager.window("c1").unwrap();
        assert_eq!(window.recent_messages.len(), 3);
        let scores: Vec<f64> = window
            .recent_messages
            .iter()
            .map(|m| m.score.final_score)
            .collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));

        let prompt = manager.get_context_for_prompt("c1");
        assert!(!prompt.contains("filler"));
        let risky_at = prompt.find("risky one").unwrap();
        let confident_at = prompt.find("confident one").unwrap();
        let plain_at = prompt.find("plain one").unwrap();
        assert!(risky_at < confident_at && confident_at < plain_at);
    }

    #[test]
    fn test_window_truncates_to_half_max_size() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let config = ContextConfig::builder().max_window_size(4).build().unwrap();
        let mut manager = manager_with(&config, clock, StepRng::new(0, 0));

        for symbol in ["1120", "2010", "2222"] {
            manager.add_message(
                "c1",
                Message::user(symbol).with_timestamp(now).with_metadata(instrument_metadata(symbol)),
            );
        }

        assert_eq!(manager.window("c1").unwrap().recent_messages.len(), 2);
    }

    #[test]
    fn test_window_rescored_as_time_passes() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let mut manager =
            manager_with(&ContextConfig::default(), Arc::clone(&clock), StepRng::new(0, 0));

        manager.add_message(
            "c1",
            Message::user("fresh").with_timestamp(now).with_metadata(instrument_metadata("2222")),
        );
        assert!(manager.get_context_for_prompt("c1").contains("fresh"));

        clock.advance(Duration::hours(6));
        assert!(!manager.get_context_for_prompt("c1").contains("fresh"));
    }

    #[test]
    fn test_insights_deduplicated() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        manager.add_message("c1", Message::user("a").with_metadata(instrument_metadata("2222")));
        manager.add_message("c1", Message::user("b").with_metadata(instrument_metadata("2222")));

        let insights = &manager.window("c1").unwrap().key_insights;
        assert_eq!(
            insights,
            &vec![
                "Instruments discussed: 2222".to_string(),
                "Markets: Tadawul".to_string()
            ]
        );
    }

    #[test]
    fn test_snapshot_on_market_mention() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        manager.add_message("c1", Message::user("no market here"));
        assert!(manager.window("c1").unwrap().market_snapshots.is_empty());

        manager.add_message("c1", Message::user("tasi").with_metadata(instrument_metadata("2222")));
        assert_eq!(manager.window("c1").unwrap().market_snapshots.len(), 1);
    }

    #[test]
    fn test_snapshot_on_high_volatility_draw() {
        let volatile = MarketContext {
            volatility_level: VolatilityLevel::High,
            ..Default::default()
        };

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut lucky =
            manager_with(&ContextConfig::default(), Arc::clone(&clock), StepRng::new(u64::MAX, 0));
        lucky.update_market_context(volatile.clone());
        lucky.add_message("c1", Message::user("hello"));
        assert_eq!(lucky.market_snapshots().len(), 1);
        assert_eq!(
            lucky.market_snapshots()[0].context.volatility_level,
            VolatilityLevel::High
        );

        let mut unlucky = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));
        unlucky.update_market_context(volatile);
        unlucky.add_message("c1", Message::user("hello"));
        assert!(unlucky.market_snapshots().is_empty());
    }

    #[test]
    fn test_windows_are_per_conversation_snapshots_shared() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        manager.add_message(
            "c1",
            Message::user("aramco one").with_timestamp(now).with_metadata(instrument_metadata("2222")),
        );
        manager.add_message(
            "c2",
            Message::user("sabic one").with_timestamp(now).with_metadata(instrument_metadata("2010")),
        );

        let first = manager.window("c1").unwrap();
        assert_eq!(first.recent_messages.len(), 1);
        assert_eq!(first.recent_messages[0].message.content, "aramco one");
        assert_eq!(first.key_insights[0], "Instruments discussed: 2222");

        let second = manager.window("c2").unwrap();
        assert_eq!(second.recent_messages.len(), 1);
        assert_eq!(second.recent_messages[0].message.content, "sabic one");
        assert_eq!(second.market_snapshots.len(), 2);

        assert_eq!(manager.market_snapshots().len(), 2);
        assert!(manager.window("c3").is_none());
        assert!(!manager.get_context_for_prompt("c1").contains("sabic one"));
    }

    #[test]
    fn test_snapshot_cap() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = ContextConfig::builder().max_snapshots(3).build().unwrap();
        let mut manager = manager_with(&config, clock, StepRng::new(0, 0));

        for i in 0..5 {
            manager.add_message(
                "c1",
                Message::user(format!("tasi {i}")).with_metadata(instrument_metadata("2222")),
            );
        }
        assert_eq!(manager.window("c1").unwrap().market_snapshots.len(), 3);
    }

    #[test]
    fn test_instrument_active_elsewhere() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));

        manager.add_message("c1", Message::user("a").with_metadata(instrument_metadata("2222")));

        let probe = Message::user("b").with_metadata(FinancialMetadata {
            instruments: vec!["2222".to_string()],
            ..Default::default()
        });
        assert!((manager.score_message(&probe).instrument_relevance - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_rendered_in_prompt() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut manager = manager_with(&ContextConfig::default(), clock, StepRng::new(0, 0));
        let mut context = MarketContext::default();
        context.major_indices.insert("TASI".to_string(), 11_850.2);
        manager.update_market_context(context);

        manager.add_message("c1", Message::user("tasi").with_metadata(instrument_metadata("2222")));
        let prompt = manager.get_context_for_prompt("c1");
        assert!(prompt.contains("Market snapshots:"));
        assert!(prompt.contains("TASI 11850.20"));
    }
}
