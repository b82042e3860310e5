//! Merges model output with the fused context and enforces the contract

use super::schema::{
    AnalysisQuality, ChatResponse, CompanyInfo, ConfidenceReport, DebugInfo, FinancialContext,
    MarketAnalysis, UserMood,
};
use crate::analyzer::{RiskLevel, Sentiment};
use crate::error::{ContextError, Result};
use crate::fusion::FusedContext;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

const MAX_INSIGHTS: usize = 5;
const MAX_QUESTIONS: usize = 3;

/// Confidence reported when no fused context backs the answer
const UNBACKED_CONFIDENCE: f64 = 0.5;

const FALLBACK_RESPONSE: &str = "Sorry, something went wrong while preparing your answer. \
     Please try again in a moment.";
const FALLBACK_THINKING: &str = "An internal error occurred; returning a fallback response.";
const NO_DATA_RESPONSE: &str = "I could not find enough market data or documents to answer that. \
     Could you name the company or sector you are interested in?";

/// Outcome class of a chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    ServerError,
}

impl ResponseStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::ServerError => 500,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Ok
    }
}

/// Fields the model may provide, all optional
#[derive(Debug, Default)]
struct ModelReply {
    response: String,
    thinking: String,
    user_mood: Option<UserMood>,
    suggested_questions: Vec<String>,
    key_insights: Vec<String>,
    company_notes: Vec<(String, String)>,
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn text(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

/// The outermost `{...}` span, ignoring code fences and chatter around it
fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

impl ModelReply {
    /// Parse leniently: JSON when present, otherwise the raw text is the answer
    fn parse(raw: &str) -> Self {
        let object = json_span(raw)
            .and_then(|span| serde_json::from_str::<Value>(span).ok())
            .filter(Value::is_object);

        let Some(object) = object else {
            let plain = raw.trim().trim_matches('`').trim();
            return Self {
                response: plain.to_string(),
                ..Self::default()
            };
        };

        let nested = object.get("financial_context");
        let field = |name: &str| object.get(name).or_else(|| nested.and_then(|n| n.get(name)));

        let company_notes = field("companies")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let symbol = item.get("symbol")?.as_str()?.trim();
                        let analysis = item.get("analysis")?.as_str()?.trim();
                        (!symbol.is_empty() && !analysis.is_empty())
                            .then(|| (symbol.to_string(), analysis.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            response: text(object.get("response")),
            thinking: text(object.get("thinking")),
            user_mood: object
                .get("user_mood")
                .and_then(Value::as_str)
                .and_then(UserMood::parse),
            suggested_questions: strings(object.get("suggested_questions")),
            key_insights: strings(field("key_insights")),
            company_notes,
        }
    }
}

fn same_symbol(a: &str, b: &str) -> bool {
    let strip = |s: &str| {
        let s = s.trim();
        s.split('.').next().unwrap_or(s).to_ascii_uppercase()
    };
    strip(a) == strip(b)
}

fn merge_unique(base: Vec<String>, extra: Vec<String>, cap: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(cap);
    for item in base.into_iter().chain(extra) {
        if merged.len() == cap {
            break;
        }
        if !merged.contains(&item) {
            merged.push(item);
        }
    }
    merged
}

fn synthesized_response(insights: &[String]) -> String {
    if insights.is_empty() {
        return NO_DATA_RESPONSE.to_string();
    }
    let mut text = String::from("Here is what the current data shows:");
    for insight in insights {
        text.push_str("\n- ");
        text.push_str(insight);
    }
    text
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ContextError::Schema(format!("{name} must be within [0, 1], got {value}")))
    }
}

/// Builds and validates [`ChatResponse`] values
#[derive(Debug, Clone, Default)]
pub struct ResponseAssembler;

impl ResponseAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Merge model output with the fused context and validate the result.
    ///
    /// Model output may be JSON, fenced JSON or plain text. Without a fused
    /// context the financial fields take neutral defaults.
    pub fn assemble(&self, model_text: &str, fused: Option<&FusedContext>) -> Result<ChatResponse> {
        let reply = ModelReply::parse(model_text);
        debug!(
            response_chars = reply.response.len(),
            model_insights = reply.key_insights.len(),
            model_questions = reply.suggested_questions.len(),
            "model reply parsed"
        );

        let response = match fused {
            Some(fused) => Self::merge(reply, fused),
            None => Self::unbacked(reply),
        };

        Self::validate(&response)?;
        Ok(response)
    }

    /// Answer from the fused context alone, used when the model is unavailable
    pub fn from_context(&self, fused: &FusedContext) -> Result<ChatResponse> {
        let mut response = Self::merge(ModelReply::default(), fused);
        response.thinking =
            "Answered from market data and documents; the language model was unavailable."
                .to_string();
        Self::validate(&response)?;
        Ok(response)
    }

    fn merge(reply: ModelReply, fused: &FusedContext) -> ChatResponse {
        let mut companies = fused.company_infos();
        for company in &mut companies {
            if let Some((_, note)) = reply
                .company_notes
                .iter()
                .find(|(symbol, _)| same_symbol(symbol, &company.symbol))
            {
                company.analysis = Some(note.clone());
            }
        }

        let key_insights = merge_unique(fused.key_insights.clone(), reply.key_insights, MAX_INSIGHTS);

        let suggested_questions = if reply.suggested_questions.is_empty() {
            fused.suggested_questions.clone()
        } else {
            merge_unique(reply.suggested_questions, Vec::new(), MAX_QUESTIONS)
        };

        let response = if reply.response.is_empty() {
            synthesized_response(&key_insights)
        } else {
            reply.response
        };

        ChatResponse {
            response,
            thinking: reply.thinking,
            user_mood: reply.user_mood.unwrap_or_default(),
            suggested_questions,
            financial_context: FinancialContext {
                companies,
                market_sentiment: fused.market_sentiment,
                risk_level: fused.risk_level,
                confidence_score: fused.confidence.overall,
                key_insights,
                market_analysis: fused.market_analysis.clone(),
                documents_used: fused.documents.clone(),
            },
            debug: DebugInfo {
                context_used: !fused.window_context.trim().is_empty(),
                market_data_used: fused.has_market_data(),
                document_data_used: fused.has_documents(),
                analysis_quality: fused.quality,
                confidence: fused.confidence,
            },
        }
    }

    fn unbacked(reply: ModelReply) -> ChatResponse {
        let key_insights = merge_unique(reply.key_insights, Vec::new(), MAX_INSIGHTS);
        let response = if reply.response.is_empty() {
            synthesized_response(&key_insights)
        } else {
            reply.response
        };

        ChatResponse {
            response,
            thinking: reply.thinking,
            user_mood: reply.user_mood.unwrap_or_default(),
            suggested_questions: merge_unique(reply.suggested_questions, Vec::new(), MAX_QUESTIONS),
            financial_context: FinancialContext {
                confidence_score: UNBACKED_CONFIDENCE,
                key_insights,
                ..FinancialContext::default()
            },
            debug: DebugInfo {
                confidence: ConfidenceReport {
                    overall: UNBACKED_CONFIDENCE,
                    ..ConfidenceReport::default()
                },
                ..DebugInfo::default()
            },
        }
    }

    /// Check a response against the output contract
    pub fn validate(response: &ChatResponse) -> Result<()> {
        if response.response.trim().is_empty() {
            return Err(ContextError::Schema("response text is empty".to_string()));
        }

        let context = &response.financial_context;
        unit_interval("confidence_score", context.confidence_score)?;
        unit_interval("debug.confidence.market", response.debug.confidence.market)?;
        unit_interval("debug.confidence.documents", response.debug.confidence.documents)?;
        unit_interval("debug.confidence.overall", response.debug.confidence.overall)?;

        if context.key_insights.len() > MAX_INSIGHTS {
            return Err(ContextError::Schema(format!(
                "{} key insights exceed the limit of {MAX_INSIGHTS}",
                context.key_insights.len()
            )));
        }
        if response.suggested_questions.len() > MAX_QUESTIONS {
            return Err(ContextError::Schema(format!(
                "{} suggested questions exceed the limit of {MAX_QUESTIONS}",
                response.suggested_questions.len()
            )));
        }

        for company in &context.companies {
            Self::validate_company(company)?;
        }

        for document in &context.documents_used {
            if document.id.trim().is_empty() {
                return Err(ContextError::Schema("document id is empty".to_string()));
            }
            if !document.relevance.is_finite() || document.relevance < 0.0 {
                return Err(ContextError::Schema(format!(
                    "document {} has invalid relevance {}",
                    document.id, document.relevance
                )));
            }
        }

        Ok(())
    }

    fn validate_company(company: &CompanyInfo) -> Result<()> {
        if company.symbol.trim().is_empty() {
            return Err(ContextError::Schema("company symbol is empty".to_string()));
        }
        let finite = |v: Option<f64>| v.is_none_or(f64::is_finite);
        if !finite(company.price) || !finite(company.change) {
            return Err(ContextError::Schema(format!(
                "company {} has a non-finite price or change",
                company.symbol
            )));
        }
        Ok(())
    }

    /// The fixed response returned when anything upstream of it failed
    pub fn fallback() -> ChatResponse {
        ChatResponse {
            response: FALLBACK_RESPONSE.to_string(),
            thinking: FALLBACK_THINKING.to_string(),
            user_mood: UserMood::Neutral,
            suggested_questions: Vec::new(),
            financial_context: FinancialContext {
                companies: Vec::new(),
                market_sentiment: Sentiment::Neutral,
                risk_level: RiskLevel::Low,
                confidence_score: 0.0,
                key_insights: Vec::new(),
                market_analysis: MarketAnalysis::default(),
                documents_used: Vec::new(),
            },
            debug: DebugInfo {
                context_used: false,
                market_data_used: false,
                document_data_used: false,
                analysis_quality: AnalysisQuality::Error,
                confidence: ConfidenceReport::default(),
            },
        }
    }

    /// Map an assembly result to what goes over the wire
    pub fn finish(&self, result: Result<ChatResponse>) -> (ResponseStatus, ChatResponse) {
        match result {
            Ok(response) => (ResponseStatus::Ok, response),
            Err(e) => {
                error!(error = %e, "returning fallback response");
                (ResponseStatus::ServerError, Self::fallback())
            }
        }
    }
}
