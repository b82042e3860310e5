//! Document, query and search result types

use crate::error::ContextError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentCategory {
    Regulation,
    Profile,
    Research,
    Educational,
    MarketUpdate,
}

impl DocumentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regulation => "regulation",
            Self::Profile => "profile",
            Self::Research => "research",
            Self::Educational => "educational",
            Self::MarketUpdate => "market-update",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regulation" => Ok(Self::Regulation),
            "profile" => Ok(Self::Profile),
            "research" => Ok(Self::Research),
            "educational" => Ok(Self::Educational),
            "market-update" | "market_update" => Ok(Self::MarketUpdate),
            other => Err(ContextError::Validation(format!(
                "unknown document category '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ar,
}

impl FromStr for Language {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ar" => Ok(Self::Ar),
            other => Err(ContextError::Validation(format!("unknown language '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: String,
    pub title: String,
    pub category: DocumentCategory,
    pub tags: BTreeSet<String>,
    pub language: Language,
    pub last_updated: DateTime<Utc>,
    pub source: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialDocument {
    pub metadata: DocumentMetadata,
    pub content: String,
    pub path: PathBuf,
}

impl FinancialDocument {
    /// Minimal document; remaining metadata via the `with_*` setters
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: DocumentCategory,
        content: impl Into<String>,
    ) -> Self {
        Self {
            metadata: DocumentMetadata {
                id: id.into(),
                title: title.into(),
                category,
                tags: BTreeSet::new(),
                language: Language::En,
                last_updated: Utc::now(),
                source: String::new(),
                version: "1".to_string(),
            },
            content: content.into(),
            path: PathBuf::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.metadata.language = language;
        self
    }

    pub fn with_last_updated(mut self, at: DateTime<Utc>) -> Self {
        self.metadata.last_updated = at;
        self
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }
}

/// Filters and term for a document search. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub search_term: Option<String>,
    pub category: Option<DocumentCategory>,
    /// Matches documents carrying any of these tags; an empty list matches nothing
    pub tags: Option<Vec<String>>,
    pub language: Option<Language>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn category(mut self, category: DocumentCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSearchResult {
    pub document: Arc<FinancialDocument>,
    pub relevance_score: f64,
    pub matched_segments: Vec<String>,
}
