//! Human-readable insights, follow-up questions and analysis lines

use super::{RiskFlag, rfc3339};
use crate::analyzer::{RiskLevel, Sentiment, TextAnalysis};
use crate::documents::{DocumentCategory, DocumentSearchResult};
use crate::market::{CompanyMarketData, SignalDirection};
use crate::response::{DocumentReference, MarketAnalysis};
use std::collections::BTreeMap;

const MAX_INSIGHTS: usize = 5;
const MAX_QUESTIONS: usize = 3;
const MAX_EXCERPTS: usize = 3;
const MAX_EXCERPT_CHARS: usize = 200;

const NOTABLE_MOVE_PCT: f64 = 3.0;
const STRONG_SIGNAL: f64 = 0.7;
const HEALTHY_MARGIN: f64 = 0.15;
const RELEVANT_DOCUMENT: f64 = 0.8;
const SECTOR_MOVE_PCT: f64 = 2.0;
const FLAT_MOVE_PCT: f64 = 0.25;

pub(super) fn average_change(companies: &[CompanyMarketData]) -> f64 {
    if companies.is_empty() {
        return 0.0;
    }
    companies.iter().map(|c| c.quote.change_percent).sum::<f64>() / companies.len() as f64
}

/// Average percent move per sector, sectors in name order
fn sector_moves(companies: &[CompanyMarketData]) -> BTreeMap<&str, (f64, usize)> {
    let mut sectors: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for company in companies {
        if let Some(sector) = company.instrument.sector.as_deref() {
            let entry = sectors.entry(sector).or_default();
            entry.0 += company.quote.change_percent;
            entry.1 += 1;
        }
    }
    for (total, count) in sectors.values_mut() {
        *total /= *count as f64;
    }
    sectors
}

/// First complete sentence of `content`, if it fits an excerpt
pub(super) fn leading_sentence(content: &str) -> Option<String> {
    let trimmed = content.trim_start();
    let end = trimmed
        .char_indices()
        .find(|(_, c)| matches!(c, '.' | '!' | '?' | '؟' | '。'))
        .map(|(i, c)| i + c.len_utf8())?;
    let sentence = trimmed[..end].split_whitespace().collect::<Vec<_>>().join(" ");
    if sentence.is_empty() || sentence.chars().count() > MAX_EXCERPT_CHARS {
        return None;
    }
    Some(sentence)
}

pub(super) fn document_reference(result: &DocumentSearchResult) -> DocumentReference {
    let metadata = &result.document.metadata;
    let mut key_excerpts: Vec<String> = result
        .matched_segments
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_EXCERPTS)
        .collect();
    if key_excerpts.is_empty() {
        key_excerpts.extend(leading_sentence(&result.document.content));
    }

    DocumentReference {
        id: metadata.id.clone(),
        title: metadata.title.clone(),
        category: metadata.category.as_str().to_string(),
        relevance: result.relevance_score,
        key_excerpts,
        last_updated: rfc3339(metadata.last_updated),
    }
}

fn signed(pct: f64) -> String {
    format!("{pct:+.2}%")
}

/// One-line state of a fetched company
pub(super) fn company_summary(company: &CompanyMarketData) -> Option<String> {
    let mut parts = vec![format!(
        "Trading at {:.2} SAR ({})",
        company.quote.price,
        signed(company.quote.change_percent)
    )];
    if let Some(pe) = company.statistics.as_ref().and_then(|s| s.pe_ratio) {
        parts.push(format!("P/E {pe:.1}"));
    }
    if let Some(signal) = company
        .signals
        .iter()
        .max_by(|a, b| a.strength.total_cmp(&b.strength))
    {
        parts.push(format!(
            "{} {}",
            signal.indicator,
            direction_word(signal.direction)
        ));
    }
    Some(parts.join(", "))
}

fn direction_word(direction: SignalDirection) -> &'static str {
    match direction {
        SignalDirection::Bullish => "bullish",
        SignalDirection::Bearish => "bearish",
        SignalDirection::Neutral => "neutral",
    }
}

fn push_unique(list: &mut Vec<String>, item: String, cap: usize) {
    if list.len() < cap && !list.contains(&item) {
        list.push(item);
    }
}

pub(super) fn key_insights(
    companies: &[CompanyMarketData],
    documents: &[DocumentSearchResult],
    references: &[DocumentReference],
    risk_level: RiskLevel,
    risk_flags: &[RiskFlag],
) -> Vec<String> {
    let mut insights = Vec::new();

    if !companies.is_empty() {
        let average = average_change(companies);
        let direction = if average > FLAT_MOVE_PCT {
            "advancing"
        } else if average < -FLAT_MOVE_PCT {
            "declining"
        } else {
            "flat"
        };
        push_unique(
            &mut insights,
            format!(
                "Tracked companies are {direction} on average ({} across {})",
                signed(average),
                companies.len()
            ),
            MAX_INSIGHTS,
        );
    }

    for company in companies {
        if company.quote.change_percent.abs() > NOTABLE_MOVE_PCT {
            push_unique(
                &mut insights,
                format!(
                    "{} ({}) moved {} to {:.2} SAR",
                    company.instrument.name,
                    company.instrument.symbol,
                    signed(company.quote.change_percent),
                    company.quote.price
                ),
                MAX_INSIGHTS,
            );
        }
    }

    for company in companies {
        for signal in company.signals.iter().filter(|s| s.strength > STRONG_SIGNAL) {
            push_unique(
                &mut insights,
                format!("{}: {}", company.instrument.name, signal.description),
                MAX_INSIGHTS,
            );
        }
    }

    for company in companies {
        if let Some(margin) = company
            .statistics
            .as_ref()
            .and_then(|s| s.profit_margin)
            .filter(|m| *m > HEALTHY_MARGIN)
        {
            push_unique(
                &mut insights,
                format!(
                    "{} runs a {:.1}% profit margin",
                    company.instrument.name,
                    margin * 100.0
                ),
                MAX_INSIGHTS,
            );
        }
    }

    for (result, reference) in documents.iter().zip(references) {
        if result.relevance_score <= RELEVANT_DOCUMENT {
            continue;
        }
        if let Some(sentence) = leading_sentence(&result.document.content) {
            push_unique(
                &mut insights,
                format!("{}: {sentence}", reference.title),
                MAX_INSIGHTS,
            );
        }
    }

    let sectors = sector_moves(companies);
    if let Some((sector, (best, _))) = sectors
        .iter()
        .max_by(|a, b| a.1.0.total_cmp(&b.1.0))
        .filter(|(_, (avg, _))| *avg > SECTOR_MOVE_PCT)
    {
        push_unique(
            &mut insights,
            format!("{sector} leads with {}", signed(*best)),
            MAX_INSIGHTS,
        );
    }
    if let Some((sector, (worst, _))) = sectors
        .iter()
        .min_by(|a, b| a.1.0.total_cmp(&b.1.0))
        .filter(|(_, (avg, _))| *avg < -SECTOR_MOVE_PCT)
    {
        push_unique(
            &mut insights,
            format!("{sector} lags with {}", signed(*worst)),
            MAX_INSIGHTS,
        );
    }

    if risk_level == RiskLevel::High {
        let flags: Vec<&str> = risk_flags.iter().map(|f| f.as_str()).collect();
        push_unique(
            &mut insights,
            format!("Elevated risk: {}", flags.join(", ")),
            MAX_INSIGHTS,
        );
    }

    insights
}

pub(super) fn suggested_questions(
    analysis: &TextAnalysis,
    companies: &[CompanyMarketData],
    documents: &[DocumentSearchResult],
    risk_level: RiskLevel,
) -> Vec<String> {
    let mut questions = Vec::new();
    let primary = companies.first();

    if let Some(company) = primary {
        let name = &company.instrument.name;
        if analysis.technical_indicators.is_empty() && !company.signals.is_empty() {
            push_unique(
                &mut questions,
                format!("What do the technical indicators say about {name}?"),
                MAX_QUESTIONS,
            );
        }
        if analysis.fundamental_factors.is_empty() && company.statistics.is_some() {
            push_unique(
                &mut questions,
                format!("How do {name}'s valuation and margins compare with its peers?"),
                MAX_QUESTIONS,
            );
        }
        if let Some(sector) = company.instrument.sector.as_deref() {
            push_unique(
                &mut questions,
                format!("How is the {sector} sector performing against TASI?"),
                MAX_QUESTIONS,
            );
        }
        if risk_level != RiskLevel::Low {
            push_unique(
                &mut questions,
                format!("What are the main risks of holding {name} right now?"),
                MAX_QUESTIONS,
            );
        }
    }

    let regulation_found = documents
        .iter()
        .any(|d| d.document.metadata.category == DocumentCategory::Regulation);
    if analysis.regulatory || regulation_found {
        push_unique(
            &mut questions,
            "Which CMA disclosure rules apply to listed companies?".to_string(),
            MAX_QUESTIONS,
        );
    }

    if questions.is_empty() {
        push_unique(
            &mut questions,
            "How is the TASI index performing today?".to_string(),
            MAX_QUESTIONS,
        );
    }

    questions
}

pub(super) fn market_analysis(
    analysis: &TextAnalysis,
    companies: &[CompanyMarketData],
    sentiment: Sentiment,
) -> MarketAnalysis {
    let technical_signals = companies
        .iter()
        .flat_map(|c| {
            c.signals.iter().map(move |s| {
                format!(
                    "{} {} ({}): {}",
                    c.instrument.symbol,
                    s.indicator,
                    direction_word(s.direction),
                    s.description
                )
            })
        })
        .collect();

    let fundamental_factors = companies
        .iter()
        .filter_map(|c| {
            let stats = c.statistics.as_ref()?;
            let mut parts = Vec::new();
            if let Some(pe) = stats.pe_ratio {
                parts.push(format!("P/E {pe:.1}"));
            }
            if let Some(margin) = stats.profit_margin {
                parts.push(format!("margin {:.1}%", margin * 100.0));
            }
            if let Some(de) = stats.debt_to_equity {
                parts.push(format!("D/E {de:.2}"));
            }
            if let Some(dy) = stats.dividend_yield {
                parts.push(format!("dividend yield {:.1}%", dy * 100.0));
            }
            (!parts.is_empty()).then(|| format!("{}: {}", c.instrument.symbol, parts.join(", ")))
        })
        .collect();

    let moves = sector_moves(companies);
    let mut sector_analysis: Vec<String> = moves
        .iter()
        .map(|(sector, (avg, count))| {
            let noun = if *count == 1 { "company" } else { "companies" };
            format!("{sector}: {} across {count} {noun}", signed(*avg))
        })
        .collect();
    for sector in &analysis.sectors {
        if !moves.contains_key(sector.as_str()) {
            sector_analysis.push(format!("{sector}: discussed, no live quotes"));
        }
    }

    let mut market_trends = vec![format!("Market sentiment: {sentiment}")];
    if !companies.is_empty() {
        market_trends.push(format!(
            "Average change: {}",
            signed(average_change(companies))
        ));
    }
    market_trends.extend(analysis.timeframes.iter().map(|t| format!("Timeframe: {t}")));

    MarketAnalysis {
        technical_signals,
        fundamental_factors,
        sector_analysis,
        market_trends,
    }
}
