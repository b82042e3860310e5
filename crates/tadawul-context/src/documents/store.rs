//! In-memory document index with category, tag and language buckets

use super::model::{DocumentCategory, DocumentQuery, DocumentSearchResult, FinancialDocument, Language};
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters of context kept either side of a matched term
const SEGMENT_CONTEXT_CHARS: usize = 50;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Append-only document index
pub struct DocumentStore {
    documents: BTreeMap<String, Arc<FinancialDocument>>,
    by_category: HashMap<DocumentCategory, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
    by_language: HashMap<Language, BTreeSet<String>>,
    clock: Arc<dyn Clock>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("documents", &self.documents.len())
            .field("categories", &self.by_category.len())
            .field("tags", &self.by_tag.len())
            .finish_non_exhaustive()
    }
}

struct TermPatterns {
    lowered: String,
    occurrence: Regex,
    segment: Regex,
}

impl TermPatterns {
    fn compile(term: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(term);
        let occurrence = RegexBuilder::new(&escaped).case_insensitive(true).build()?;
        let segment = RegexBuilder::new(&format!(
            ".{{0,{SEGMENT_CONTEXT_CHARS}}}{escaped}.{{0,{SEGMENT_CONTEXT_CHARS}}}"
        ))
        .case_insensitive(true)
        .build()?;
        Ok(Self {
            lowered: term.to_lowercase(),
            occurrence,
            segment,
        })
    }

    fn matches(&self, document: &FinancialDocument) -> bool {
        document.content.to_lowercase().contains(&self.lowered)
            || document.metadata.title.to_lowercase().contains(&self.lowered)
            || document
                .metadata
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&self.lowered))
    }

    fn density(&self, content: &str) -> f64 {
        let length = content.chars().count();
        if length == 0 {
            return 0.0;
        }
        self.occurrence.find_iter(content).count() as f64 / length as f64
    }

    fn segments(&self, content: &str) -> Vec<String> {
        self.segment
            .find_iter(content)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            documents: BTreeMap::new(),
            by_category: HashMap::new(),
            by_tag: HashMap::new(),
            by_language: HashMap::new(),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert a document and index it.
    ///
    /// Re-adding an id replaces the document and moves it between buckets.
    pub fn add_document(&mut self, document: FinancialDocument) {
        let id = document.metadata.id.clone();
        if let Some(previous) = self.documents.remove(&id) {
            debug!(id = %id, "replacing document");
            self.unindex(&previous);
        }

        self.by_category
            .entry(document.metadata.category)
            .or_default()
            .insert(id.clone());
        for tag in &document.metadata.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(id.clone());
        }
        self.by_language
            .entry(document.metadata.language)
            .or_default()
            .insert(id.clone());

        self.documents.insert(id, Arc::new(document));
    }

    fn unindex(&mut self, document: &FinancialDocument) {
        let id = &document.metadata.id;
        if let Some(bucket) = self.by_category.get_mut(&document.metadata.category) {
            bucket.remove(id);
        }
        for tag in &document.metadata.tags {
            if let Some(bucket) = self.by_tag.get_mut(tag) {
                bucket.remove(id);
            }
        }
        if let Some(bucket) = self.by_language.get_mut(&document.metadata.language) {
            bucket.remove(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<FinancialDocument>> {
        self.documents.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ids_in_category(&self, category: DocumentCategory) -> Option<&BTreeSet<String>> {
        self.by_category.get(&category)
    }

    pub fn ids_with_tag(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.by_tag.get(tag)
    }

    pub fn ids_in_language(&self, language: Language) -> Option<&BTreeSet<String>> {
        self.by_language.get(&language)
    }

    /// Filter, score and rank documents
    pub fn search_documents(&self, query: &DocumentQuery) -> Vec<DocumentSearchResult> {
        let term = query
            .search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let patterns = match term.map(TermPatterns::compile).transpose() {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(error = %e, "could not compile search term");
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let mut results: Vec<DocumentSearchResult> = self
            .documents
            .values()
            .filter(|doc| self.passes_filters(doc, query))
            .filter(|doc| patterns.as_ref().is_none_or(|p| p.matches(doc)))
            .map(|doc| {
                let recency = recency_boost(doc.metadata.last_updated, now);
                let (relevance_score, matched_segments) = match &patterns {
                    Some(p) => ((1.0 + p.density(&doc.content)) * recency, p.segments(&doc.content)),
                    None => (recency, Vec::new()),
                };
                DocumentSearchResult {
                    document: Arc::clone(doc),
                    relevance_score,
                    matched_segments,
                }
            })
            .collect();

        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        debug!(
            term = term.unwrap_or(""),
            results = results.len(),
            "document search"
        );
        results
    }

    fn passes_filters(&self, document: &FinancialDocument, query: &DocumentQuery) -> bool {
        let id = &document.metadata.id;

        if let Some(category) = query.category {
            let indexed = self
                .by_category
                .get(&category)
                .is_some_and(|ids| ids.contains(id));
            if !indexed || document.metadata.category != category {
                return false;
            }
        }

        if let Some(tags) = &query.tags {
            let tagged = tags.iter().any(|tag| {
                document.metadata.tags.contains(tag)
                    && self.by_tag.get(tag).is_some_and(|ids| ids.contains(id))
            });
            if !tagged {
                return false;
            }
        }

        if let Some(language) = query.language {
            let indexed = self
                .by_language
                .get(&language)
                .is_some_and(|ids| ids.contains(id));
            if !indexed || document.metadata.language != language {
                return false;
            }
        }

        true
    }
}

/// `1 + 1/(1 + age in days)`; future timestamps count as age zero
fn recency_boost(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - last_updated).num_seconds().max(0) as f64 / SECONDS_PER_DAY;
    1.0 + 1.0 / (1.0 + age_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn fixed_store() -> (DocumentStore, DateTime<Utc>) {
        let now = Utc::now();
        (DocumentStore::with_clock(Arc::new(ManualClock::new(now))), now)
    }

    fn padded(term: &str, total_chars: usize) -> String {
        let mut content = String::from(term);
        content.push_str(&"x".repeat(total_chars - term.len()));
        content
    }

    #[test]
    fn test_add_document_indexes_everywhere() {
        let (mut store, _) = fixed_store();
        store.add_document(
            FinancialDocument::new("cma-1", "Listing rules", DocumentCategory::Regulation, "text")
                .with_tags(["ipo", "listing"])
                .with_language(Language::Ar),
        );

        assert!(store.ids_in_category(DocumentCategory::Regulation).unwrap().contains("cma-1"));
        assert!(store.ids_with_tag("ipo").unwrap().contains("cma-1"));
        assert!(store.ids_with_tag("listing").unwrap().contains("cma-1"));
        assert!(store.ids_in_language(Language::Ar).unwrap().contains("cma-1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_readding_moves_buckets() {
        let (mut store, _) = fixed_store();
        store.add_document(
            FinancialDocument::new("d1", "t", DocumentCategory::Research, "a").with_tags(["old"]),
        );
        store.add_document(
            FinancialDocument::new("d1", "t", DocumentCategory::Profile, "b").with_tags(["new"]),
        );

        assert_eq!(store.len(), 1);
        assert!(!store.ids_in_category(DocumentCategory::Research).unwrap().contains("d1"));
        assert!(store.ids_in_category(DocumentCategory::Profile).unwrap().contains("d1"));
        assert!(!store.ids_with_tag("old").unwrap().contains("d1"));
        assert_eq!(store.get("d1").unwrap().content, "b");
    }

    #[test]
    fn test_single_fresh_match_scores_about_two() {
        let (mut store, now) = fixed_store();
        store.add_document(
            FinancialDocument::new("r1", "Outlook", DocumentCategory::Research, padded("growth", 1000))
                .with_tags(["tech"])
                .with_last_updated(now),
        );

        let results = store.search_documents(&DocumentQuery::new().term("growth"));
        assert_eq!(results.len(), 1);
        assert!((results[0].relevance_score - 2.002).abs() < 1e-9);
        assert!((results[0].relevance_score - 2.0).abs() < 0.01);
        assert_eq!(results[0].matched_segments.len(), 1);
        assert!(results[0].matched_segments[0].starts_with("growth"));
    }

    #[test]
    fn test_recency_boost_decays() {
        let now = Utc::now();
        assert!((recency_boost(now, now) - 2.0).abs() < 1e-9);
        assert!((recency_boost(now - Duration::days(1), now) - 1.5).abs() < 1e-9);
        assert!((recency_boost(now + Duration::days(3), now) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_results_sorted_and_limited() {
        let (mut store, now) = fixed_store();
        for (i, days) in [10, 0, 3, 1].into_iter().enumerate() {
            store.add_document(
                FinancialDocument::new(format!("d{i}"), "Banks", DocumentCategory::Research, "bank news")
                    .with_last_updated(now - Duration::days(days)),
            );
        }

        let all = store.search_documents(&DocumentQuery::new().term("bank"));
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
        assert_eq!(all[0].document.id(), "d1");

        let limited = store.search_documents(&DocumentQuery::new().term("bank").limit(2));
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].document.id(), all[0].document.id());
    }

    #[test]
    fn test_filters() {
        let (mut store, _) = fixed_store();
        store.add_document(
            FinancialDocument::new("a", "Aramco profile", DocumentCategory::Profile, "energy")
                .with_tags(["2222", "energy"]),
        );
        store.add_document(
            FinancialDocument::new("b", "Bank rules", DocumentCategory::Regulation, "capital")
                .with_tags(["banks"])
                .with_language(Language::Ar),
        );

        let profiles = store.search_documents(&DocumentQuery::new().category(DocumentCategory::Profile));
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].document.id(), "a");
        assert!(profiles[0].matched_segments.is_empty());

        let tagged = store.search_documents(&DocumentQuery::new().tags(["banks", "2222"]));
        assert_eq!(tagged.len(), 2);

        let arabic = store.search_documents(&DocumentQuery::new().language(Language::Ar));
        assert_eq!(arabic.len(), 1);
        assert_eq!(arabic[0].document.id(), "b");
    }

    #[test]
    fn test_unknown_or_empty_filters_yield_nothing() {
        let (mut store, _) = fixed_store();
        store.add_document(FinancialDocument::new("a", "t", DocumentCategory::Profile, "c"));

        let unknown_tag = store.search_documents(&DocumentQuery::new().tags(["nope"]));
        assert!(unknown_tag.is_empty());

        let empty_tags = store.search_documents(&DocumentQuery::new().tags(Vec::<String>::new()));
        assert!(empty_tags.is_empty());

        let absent_category =
            store.search_documents(&DocumentQuery::new().category(DocumentCategory::Educational));
        assert!(absent_category.is_empty());

        assert!(DocumentStore::new().search_documents(&DocumentQuery::new()).is_empty());
    }

    #[test]
    fn test_term_matches_title_and_tags_case_insensitively() {
        let (mut store, _) = fixed_store();
        store.add_document(FinancialDocument::new("a", "SABIC Earnings", DocumentCategory::Research, "q3"));
        store.add_document(
            FinancialDocument::new("b", "Note", DocumentCategory::Research, "q3").with_tags(["Dividends"]),
        );
        store.add_document(FinancialDocument::new("c", "Other", DocumentCategory::Research, "q3"));

        let by_title = store.search_documents(&DocumentQuery::new().term("sabic"));
        assert_eq!(by_title.len(), 1);
        // title-only hits still score, with zero density
        assert!(by_title[0].matched_segments.is_empty());

        let by_tag = store.search_documents(&DocumentQuery::new().term("dividend"));
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].document.id(), "b");
    }

    #[test]
    fn test_special_characters_in_term() {
        let (mut store, _) = fixed_store();
        store.add_document(FinancialDocument::new("a", "t", DocumentCategory::Research, "P/E (ttm) is 15"));

        let results = store.search_documents(&DocumentQuery::new().term("(ttm)"));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_segments, vec!["P/E (ttm) is 15".to_string()]);
    }

    #[test]
    fn test_repeated_searches_identical() {
        let (mut store, now) = fixed_store();
        for i in 0..5 {
            store.add_document(
                FinancialDocument::new(format!("d{i}"), "same", DocumentCategory::Research, "oil oil")
                    .with_last_updated(now - Duration::hours(i)),
            );
        }
        let query = DocumentQuery::new().term("oil").limit(3);
        let first = store.search_documents(&query);
        let second = store.search_documents(&query);
        assert_eq!(first, second);
    }
}
