//! End-to-end handling of one chat message

use crate::analyzer::{CompanyMatch, EntityAnalyzer, TextAnalysis};
use crate::clock::{Clock, SystemClock};
use crate::config::ContextConfig;
use crate::conversation::{ContextWindowManager, Message, MessageRole};
use crate::documents::{DocumentCategory, DocumentQuery, DocumentSearchResult, DocumentStore};
use crate::error::{ContextError, Result};
use crate::fusion::{ContextFusion, FusedContext};
use crate::gazetteer::{Gazetteer, Instrument};
use crate::market::{MarketDataProvider, MarketDataService};
use crate::prompts::PromptRenderer;
use crate::response::{ChatResponse, ResponseAssembler, ResponseStatus};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tadawul_llm::{CompletionRequest, LLMProvider};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// What the caller gets back for one message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOutcome {
    pub status: ResponseStatus,
    pub response: ChatResponse,
    /// The assistant message recorded in the conversation; callers that
    /// replay history send this one back so it is recognised as seen
    #[serde(skip)]
    pub reply: Option<Message>,
}

/// Owns every engine component and runs the request flow
pub struct ChatService {
    config: ContextConfig,
    analyzer: EntityAnalyzer,
    market: MarketDataService,
    documents: Arc<RwLock<DocumentStore>>,
    window: Mutex<ContextWindowManager>,
    llm: Arc<dyn LLMProvider>,
    fusion: ContextFusion,
    prompts: PromptRenderer,
    assembler: ResponseAssembler,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(
        config: ContextConfig,
        gazetteer: Arc<Gazetteer>,
        provider: Arc<dyn MarketDataProvider>,
        llm: Arc<dyn LLMProvider>,
        documents: DocumentStore,
    ) -> Result<Self> {
        let window = ContextWindowManager::new(&config);
        Ok(Self {
            analyzer: EntityAnalyzer::new(gazetteer),
            market: MarketDataService::new(provider, &config),
            documents: Arc::new(RwLock::new(documents)),
            window: Mutex::new(window),
            llm,
            fusion: ContextFusion::new(),
            prompts: PromptRenderer::new()?,
            assembler: ResponseAssembler::new(),
            clock: Arc::new(SystemClock),
            config,
        })
    }

    /// Replace the window manager, e.g. one with a fixed clock and RNG
    pub fn with_window_manager(mut self, manager: ContextWindowManager) -> Self {
        self.window = Mutex::new(manager);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shared handle to the document store
    pub fn documents(&self) -> Arc<RwLock<DocumentStore>> {
        Arc::clone(&self.documents)
    }

    pub fn window_manager(&self) -> &Mutex<ContextWindowManager> {
        &self.window
    }

    /// Answer the last user message of `messages`.
    ///
    /// Messages already seen in this conversation are not ingested twice.
    /// Never fails: errors become the fallback response with a server-error
    /// status.
    #[instrument(skip(self, messages), fields(messages = messages.len()))]
    pub async fn handle(&self, conversation_id: &str, messages: Vec<Message>) -> ChatOutcome {
        let (result, reply) = match self.respond(conversation_id, messages).await {
            Ok((response, reply)) => (Ok(response), Some(reply)),
            Err(e) => (Err(e), None),
        };
        let (status, response) = self.assembler.finish(result);

        info!(
            status = status.code(),
            companies = response.financial_context.companies.len(),
            documents = response.financial_context.documents_used.len(),
            quality = %response.debug.analysis_quality,
            "chat message handled"
        );

        ChatOutcome {
            status,
            response,
            reply,
        }
    }

    async fn respond(
        &self,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> Result<(ChatResponse, Message)> {
        let (question_id, question) = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| (m.id.clone(), m.content.clone()))
            .ok_or_else(|| ContextError::Validation("no user message to answer".to_string()))?;

        let (analysis, window_context) = self
            .ingest(conversation_id, messages, &question_id, &question)
            .await;
        debug!(
            companies = analysis.companies.len(),
            sectors = analysis.sectors.len(),
            regulatory = analysis.regulatory,
            confidence = analysis.confidence,
            "question analyzed"
        );

        let fused = self.gather(analysis, window_context).await;

        let text = match self.ask_model(&fused, &question).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, provider = self.llm.name(), "model unavailable, answering from context");
                None
            }
        };

        let response = match text {
            Some(text) => self.assembler.assemble(&text, Some(&fused))?,
            None => self.assembler.from_context(&fused)?,
        };

        let reply = self.record_reply(conversation_id, &response.response).await;
        Ok((response, reply))
    }

    /// Add unseen messages to the window and analyze the question against
    /// the company under discussion before it was asked
    async fn ingest(
        &self,
        conversation_id: &str,
        messages: Vec<Message>,
        question_id: &str,
        question: &str,
    ) -> (TextAnalysis, String) {
        let mut window = self.window.lock().await;
        let mut analysis = None;

        for message in messages {
            let current = window.current_company(conversation_id).map(str::to_string);
            if message.id == question_id {
                analysis = Some(self.analyzer.analyze(question, current.as_deref()));
            }
            if window.contains_message(conversation_id, &message.id) {
                continue;
            }
            let message = if message.metadata.is_some() {
                message
            } else {
                let metadata = self.analyzer.extract_metadata(&message.content, current.as_deref());
                message.with_metadata(metadata)
            };
            window.add_message(conversation_id, message);
        }

        let analysis = analysis.unwrap_or_else(|| {
            self.analyzer
                .analyze(question, window.current_company(conversation_id))
        });
        (analysis, window.get_context_for_prompt(conversation_id))
    }

    fn instrument_for(&self, company: &CompanyMatch) -> Instrument {
        if let Some(known) = self.analyzer.gazetteer().get(&company.symbol) {
            return known.clone();
        }
        let instrument = Instrument::new(company.symbol.clone(), company.name.clone());
        match &company.sector {
            Some(sector) => instrument.with_sector(sector.clone()),
            None => instrument,
        }
    }

    /// Document queries implied by the analysis
    fn document_queries(&self, analysis: &TextAnalysis) -> Vec<DocumentQuery> {
        let limit = self.config.documents_per_lookup;
        let mut queries = Vec::new();

        for company in &analysis.companies {
            queries.push(DocumentQuery::new().term(company.name.clone()).limit(limit));
            queries.push(
                DocumentQuery::new()
                    .tags([company.symbol.clone()])
                    .limit(limit),
            );
        }
        for sector in &analysis.sectors {
            queries.push(DocumentQuery::new().term(sector.clone()).limit(limit));
        }
        for factor in &analysis.fundamental_factors {
            queries.push(DocumentQuery::new().term(factor.clone()).limit(limit));
        }
        for indicator in &analysis.technical_indicators {
            queries.push(
                DocumentQuery::new()
                    .term(indicator.clone())
                    .category(DocumentCategory::Educational)
                    .limit(limit),
            );
        }
        for market in &analysis.markets {
            queries.push(
                DocumentQuery::new()
                    .term(market.clone())
                    .category(DocumentCategory::MarketUpdate)
                    .limit(limit),
            );
        }
        if analysis.regulatory {
            queries.push(
                DocumentQuery::new()
                    .category(DocumentCategory::Regulation)
                    .limit(limit),
            );
        }

        queries
    }

    /// Concurrent market and document fan-out, then fusion
    async fn gather(&self, analysis: TextAnalysis, window_context: String) -> FusedContext {
        let instruments: Vec<Instrument> = analysis
            .companies
            .iter()
            .map(|c| self.instrument_for(c))
            .collect();
        let queries = self.document_queries(&analysis);

        let market_lookups = instruments.iter().map(|i| self.market.company_data(i));
        let document_lookups = queries
            .iter()
            .map(|query| async move { self.documents.read().await.search_documents(query) });

        let (companies, batches) = tokio::join!(join_all(market_lookups), join_all(document_lookups));
        let companies: Vec<_> = companies.into_iter().flatten().collect();
        let documents = merge_documents(batches, self.config.max_documents);

        debug!(
            requested = instruments.len(),
            fetched = companies.len(),
            queries = queries.len(),
            documents = documents.len(),
            "fan-out complete"
        );

        self.fusion
            .fuse(analysis, companies, &documents, window_context, self.clock.now())
    }

    async fn ask_model(&self, fused: &FusedContext, question: &str) -> Result<String> {
        let request = CompletionRequest::builder(self.config.model.clone())
            .system(self.prompts.system_prompt(fused)?)
            .add_message(tadawul_llm::Message::user(
                self.prompts.user_prompt(fused, question)?,
            ))
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature)
            .json_mode(true)
            .build();

        let text = self.llm.complete_text(request).await?;
        Ok(text)
    }

    async fn record_reply(&self, conversation_id: &str, reply: &str) -> Message {
        let mut window = self.window.lock().await;
        let current = window.current_company(conversation_id).map(str::to_string);
        let metadata = self.analyzer.extract_metadata(reply, current.as_deref());
        let message = Message::assistant(reply).with_metadata(metadata);
        window.add_message(conversation_id, message.clone());
        message
    }
}

/// Union of lookup results by id, keeping each document's best score,
/// ranked and capped
fn merge_documents(
    batches: Vec<Vec<DocumentSearchResult>>,
    max_documents: usize,
) -> Vec<DocumentSearchResult> {
    let mut best: HashMap<String, DocumentSearchResult> = HashMap::new();
    for result in batches.into_iter().flatten() {
        let id = result.document.metadata.id.clone();
        match best.entry(id) {
            Entry::Occupied(mut slot) => {
                if result.relevance_score > slot.get().relevance_score {
                    slot.insert(result);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(result);
            }
        }
    }

    let mut merged: Vec<DocumentSearchResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.document.metadata.id.cmp(&b.document.metadata.id))
    });
    merged.truncate(max_documents);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::FinancialDocument;
    use crate::error::FetchFailure;
    use crate::market::fixtures::{quote, statistics};
    use crate::market::{KeyStatistics, MockMarketDataProvider, PriceBar, Quote};
    use crate::response::AnalysisQuality;
    use async_trait::async_trait;
    use rand::rngs::mock::StepRng;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tadawul_llm::{CompletionResponse, LLMError, StopReason, TokenUsage};

    /// Replies with a fixed text and records every request
    struct ScriptedModel {
        reply: Option<String>,
        requests: StdMutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                requests: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedModel {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> tadawul_llm::Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Some(text) => Ok(CompletionResponse {
                    message: tadawul_llm::Message::assistant(text.clone()),
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                }),
                None => Err(LLMError::RequestFailed("connection refused".to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn healthy_provider() -> MockMarketDataProvider {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_quote()
            .returning(|symbol| Ok(quote(symbol, 28.1, 1.8)));
        provider.expect_statistics().returning(|_| Ok(statistics()));
        provider.expect_history().returning(|_| Ok(Vec::new()));
        provider
    }

    fn store() -> DocumentStore {
        let mut store = DocumentStore::new();
        store.add_document(
            FinancialDocument::new(
                "aramco-profile",
                "Saudi Aramco company profile",
                DocumentCategory::Profile,
                "Saudi Aramco is the world's largest oil producer. It listed on Tadawul in 2019.",
            )
            .with_tags(["2222", "energy"]),
        );
        store.add_document(FinancialDocument::new(
            "cma-disclosure",
            "CMA continuing obligations",
            DocumentCategory::Regulation,
            "Listed issuers must disclose material developments without delay. Penalties apply.",
        ));
        store
    }

    fn service(provider: impl MarketDataProvider + 'static, model: Arc<ScriptedModel>) -> ChatService {
        let config = ContextConfig::default();
        let window = ContextWindowManager::with_parts(
            &config,
            Arc::new(SystemClock),
            Box::new(StepRng::new(0, 0)),
        );
        ChatService::new(
            config,
            Arc::new(Gazetteer::tadawul()),
            Arc::new(provider),
            model,
            store(),
        )
        .unwrap()
        .with_window_manager(window)
    }

    const MODEL_JSON: &str = r#"{"response": "Aramco gained 1.8% today.", "thinking": "quote", "user_mood": "curious"}"#;

    #[tokio::test]
    async fn test_handle_full_flow() {
        let model = ScriptedModel::replying(MODEL_JSON);
        let service = service(healthy_provider(), Arc::clone(&model));

        let outcome = service
            .handle("c1", vec![Message::user("How is Saudi Aramco 2222 doing today?")])
            .await;

        assert_eq!(outcome.status, ResponseStatus::Ok);
        let response = &outcome.response;
        assert_eq!(response.response, "Aramco gained 1.8% today.");
        assert_eq!(response.financial_context.companies[0].symbol, "2222");
        assert_eq!(
            response.financial_context.documents_used[0].id,
            "aramco-profile"
        );
        assert!(response.debug.market_data_used);
        assert!(response.debug.document_data_used);
        assert!(ResponseAssembler::validate(response).is_ok());

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
        assert!(requests[0].system.as_deref().is_some_and(|s| s.contains("Tadawul")));
    }

    struct StalledQuotes;

    #[async_trait]
    impl MarketDataProvider for StalledQuotes {
        async fn quote(&self, symbol: &str) -> Result<Quote> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(quote(symbol, 1.0, 0.0))
        }

        async fn statistics(&self, _symbol: &str) -> Result<KeyStatistics> {
            Ok(statistics())
        }

        async fn history(&self, symbol: &str) -> Result<Vec<PriceBar>> {
            Err(ContextError::fetch(symbol, FetchFailure::Status(404)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_timeout_degrades_instead_of_failing() {
        let healthy = service(healthy_provider(), ScriptedModel::replying(MODEL_JSON));
        let stalled = service(StalledQuotes, ScriptedModel::replying(MODEL_JSON));
        let question = "How is Saudi Aramco 2222 doing today?";

        let good = healthy.handle("c", vec![Message::user(question)]).await;
        let degraded = stalled.handle("c", vec![Message::user(question)]).await;

        assert_eq!(degraded.status, ResponseStatus::Ok);
        assert!(degraded.response.financial_context.companies.is_empty());
        assert!(!degraded.response.debug.market_data_used);
        assert!(
            degraded.response.debug.confidence.overall < good.response.debug.confidence.overall
        );
    }

    #[tokio::test]
    async fn test_model_failure_answers_from_context() {
        let service = service(healthy_provider(), ScriptedModel::failing());
        let outcome = service
            .handle("c1", vec![Message::user("How is Saudi Aramco 2222 doing today?")])
            .await;

        assert_eq!(outcome.status, ResponseStatus::Ok);
        assert!(outcome.response.response.starts_with("Here is what the current data shows:"));
        assert!(outcome.response.thinking.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_missing_user_message_is_server_error() {
        let service = service(healthy_provider(), ScriptedModel::replying(MODEL_JSON));
        let outcome = service
            .handle("c1", vec![Message::assistant("Hello, how can I help?")])
            .await;

        assert_eq!(outcome.status, ResponseStatus::ServerError);
        assert_eq!(outcome.response.debug.analysis_quality, AnalysisQuality::Error);
        assert!(outcome.reply.is_none());
    }

    #[tokio::test]
    async fn test_history_not_ingested_twice() {
        let service = service(healthy_provider(), ScriptedModel::replying(MODEL_JSON));
        let first = Message::user("How is Saudi Aramco 2222 doing today?");

        service.handle("c1", vec![first.clone()]).await;
        let second = Message::user("And SABIC 2010?");
        service.handle("c1", vec![first, second]).await;

        let window = service.window_manager().lock().await;
        // two questions plus two recorded replies
        assert_eq!(window.conversation("c1").unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_replayed_reply_is_not_stored_again() {
        let service = service(healthy_provider(), ScriptedModel::replying(MODEL_JSON));
        let mut history = vec![Message::user("How is Saudi Aramco 2222 doing today?")];

        let outcome = service.handle("c1", history.clone()).await;
        let reply = outcome.reply.expect("recorded reply");
        assert_eq!(reply.role, MessageRole::Assistant);
        assert_eq!(reply.content, outcome.response.response);
        history.push(reply);
        history.push(Message::user("And SABIC 2010?"));

        let outcome = service.handle("c1", history).await;
        assert!(outcome.reply.is_some());

        let window = service.window_manager().lock().await;
        let messages = &window.conversation("c1").unwrap().messages;
        let assistant = messages
            .iter()
            .filter(|m| m.role == MessageRole::Assistant)
            .count();
        assert_eq!(messages.len(), 4);
        assert_eq!(assistant, 2);
    }

    #[tokio::test]
    async fn test_follow_up_keeps_company_in_focus() {
        let service = service(healthy_provider(), ScriptedModel::replying(MODEL_JSON));
        let first = Message::user("Tell me about SABIC 2010");
        service.handle("c1", vec![first.clone()]).await;

        let outcome = service
            .handle("c1", vec![first, Message::user("What about its dividend?")])
            .await;

        let companies = &outcome.response.financial_context.companies;
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].symbol, "2010");
    }

    #[tokio::test]
    async fn test_regulatory_question_pulls_regulation_documents() {
        let service = service(healthy_provider(), ScriptedModel::replying(MODEL_JSON));
        let outcome = service
            .handle("c1", vec![Message::user("What disclosure regulations does the CMA enforce?")])
            .await;

        let documents = &outcome.response.financial_context.documents_used;
        assert!(documents.iter().any(|d| d.id == "cma-disclosure"));
    }

    #[test]
    fn test_merge_documents_keeps_best_score() {
        let doc = |id: &str, score: f64| DocumentSearchResult {
            document: Arc::new(FinancialDocument::new(id, id, DocumentCategory::Research, "x")),
            relevance_score: score,
            matched_segments: Vec::new(),
        };
        let merged = merge_documents(
            vec![
                vec![doc("a", 1.2), doc("b", 1.5)],
                vec![doc("a", 1.9), doc("c", 1.1)],
            ],
            2,
        );

        let ids: Vec<_> = merged.iter().map(|d| d.document.metadata.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((merged[0].relevance_score - 1.9).abs() < 1e-9);
    }
}
