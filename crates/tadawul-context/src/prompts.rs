//! Prompt templates rendered from the fused context

use crate::error::Result;
use crate::fusion::FusedContext;
use minijinja::{Environment, context};
use serde::Serialize;

const SYSTEM_TEMPLATE: &str = r#"You are a financial assistant specialised in the Saudi stock market (Tadawul).
Answer in the language of the question. Ground every statement in the market data and documents below; say so when data is missing.
Never give personalised investment advice.

Reply with a single JSON object and nothing else:
{
  "response": "the answer shown to the user",
  "thinking": "one or two sentences on how you reached the answer",
  "user_mood": "positive | neutral | negative | curious | frustrated | confused",
  "suggested_questions": ["up to three follow-up questions"],
  "key_insights": ["short factual insights"],
  "companies": [{"symbol": "2222", "analysis": "one-line view"}]
}

Current assessment: sentiment {{ sentiment }}, risk {{ risk_level }}{% if risk_flags %} ({{ risk_flags | join(", ") }}){% endif %}, data quality {{ quality }}, confidence {{ confidence }}."#;

const USER_TEMPLATE: &str = r#"{% if companies %}Market data:
{% for c in companies %}- {{ c.name }} ({{ c.symbol }}{% if c.sector %}, {{ c.sector }}{% endif %}): {{ c.price }} SAR, {{ c.change }}
{% for line in c.details %}  - {{ line }}
{% endfor %}{% endfor %}
{% endif %}{% if documents %}Reference documents:
{% for d in documents %}- [{{ d.category }}] {{ d.title }} (relevance {{ d.relevance }}, updated {{ d.last_updated }})
{% for e in d.excerpts %}  > {{ e }}
{% endfor %}{% endfor %}
{% endif %}{% if insights %}Key insights:
{% for i in insights %}- {{ i }}
{% endfor %}
{% endif %}{% if window %}{{ window }}

{% endif %}Question: {{ question }}"#;

#[derive(Debug, Serialize)]
struct CompanyView {
    symbol: String,
    name: String,
    sector: Option<String>,
    price: String,
    change: String,
    details: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DocumentView {
    title: String,
    category: String,
    relevance: String,
    last_updated: String,
    excerpts: Vec<String>,
}

/// Renders the system and user prompts
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)?;
        env.add_template("user", USER_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn system_prompt(&self, fused: &FusedContext) -> Result<String> {
        let flags: Vec<&str> = fused.risk_flags.iter().map(|f| f.as_str()).collect();
        let rendered = self.env.get_template("system")?.render(context! {
            sentiment => fused.market_sentiment.as_str(),
            risk_level => fused.risk_level.as_str(),
            risk_flags => flags,
            quality => fused.quality.as_str(),
            confidence => format!("{:.2}", fused.confidence.overall),
        })?;
        Ok(rendered)
    }

    pub fn user_prompt(&self, fused: &FusedContext, question: &str) -> Result<String> {
        let companies: Vec<CompanyView> = fused
            .companies
            .iter()
            .map(|c| {
                let mut details: Vec<String> = fused
                    .market_analysis
                    .fundamental_factors
                    .iter()
                    .filter(|line| line.starts_with(&format!("{}:", c.instrument.symbol)))
                    .cloned()
                    .collect();
                details.extend(c.signals.iter().map(|s| s.description.clone()));
                CompanyView {
                    symbol: c.instrument.symbol.clone(),
                    name: c.instrument.name.clone(),
                    sector: c.instrument.sector.clone(),
                    price: format!("{:.2}", c.quote.price),
                    change: format!("{:+.2}%", c.quote.change_percent),
                    details,
                }
            })
            .collect();

        let documents: Vec<DocumentView> = fused
            .documents
            .iter()
            .map(|d| DocumentView {
                title: d.title.clone(),
                category: d.category.clone(),
                relevance: format!("{:.2}", d.relevance),
                last_updated: d.last_updated.clone(),
                excerpts: d.key_excerpts.clone(),
            })
            .collect();

        let rendered = self.env.get_template("user")?.render(context! {
            companies => companies,
            documents => documents,
            insights => fused.key_insights,
            window => fused.window_context.trim(),
            question => question.trim(),
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::EntityAnalyzer;
    use crate::documents::{DocumentCategory, DocumentSearchResult, FinancialDocument};
    use crate::fusion::ContextFusion;
    use crate::gazetteer::{Gazetteer, Instrument};
    use crate::market::CompanyMarketData;
    use crate::market::fixtures::{quote, statistics};
    use chrono::Utc;
    use std::sync::Arc;

    fn fused(with_data: bool) -> FusedContext {
        let question = "What is the outlook for Al Rajhi Bank 1120?";
        let analysis = EntityAnalyzer::new(Arc::new(Gazetteer::tadawul())).analyze(question, None);
        let (companies, documents) = if with_data {
            (
                vec![CompanyMarketData {
                    instrument: Instrument::new("1120", "Al Rajhi Bank").with_sector("Banks"),
                    quote: quote("1120.SR", 98.4, -1.25),
                    statistics: Some(statistics()),
                    signals: Vec::new(),
                }],
                vec![DocumentSearchResult {
                    document: Arc::new(FinancialDocument::new(
                        "rajhi-profile",
                        "Al Rajhi Bank Profile",
                        DocumentCategory::Profile,
                        "Al Rajhi is the largest Islamic bank. It operates across the Kingdom.",
                    )),
                    relevance_score: 1.4,
                    matched_segments: Vec::new(),
                }],
            )
        } else {
            (Vec::new(), Vec::new())
        };
        ContextFusion::new().fuse(analysis, companies, &documents, String::new(), Utc::now())
    }

    #[test]
    fn test_system_prompt_reports_assessment() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer.system_prompt(&fused(true)).unwrap();

        assert!(prompt.contains("Tadawul"));
        assert!(prompt.contains("\"suggested_questions\""));
        assert!(prompt.contains("sentiment bearish"));
        assert!(prompt.contains("risk low"));
    }

    #[test]
    fn test_user_prompt_sections() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer
            .user_prompt(&fused(true), "  What is the outlook for Al Rajhi Bank 1120?  ")
            .unwrap();

        assert!(prompt.contains("- Al Rajhi Bank (1120, Banks): 98.40 SAR, -1.25%"));
        assert!(prompt.contains("1120: P/E 18.0"));
        assert!(prompt.contains("[profile] Al Rajhi Bank Profile (relevance 1.40"));
        assert!(prompt.contains("> Al Rajhi is the largest Islamic bank."));
        assert!(prompt.ends_with("Question: What is the outlook for Al Rajhi Bank 1120?"));
    }

    #[test]
    fn test_user_prompt_without_data_is_just_the_question() {
        let renderer = PromptRenderer::new().unwrap();
        let prompt = renderer.user_prompt(&fused(false), "hello").unwrap();
        assert_eq!(prompt, "Question: hello");
    }
}
