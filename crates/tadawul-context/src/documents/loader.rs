//! Loads a document corpus from a JSON manifest
//!
//! ```json
//! { "documents": [
//!   { "id": "cma-listing", "title": "Listing Rules", "category": "regulation",
//!     "tags": ["ipo"], "language": "en", "last_updated": "2024-05-01T00:00:00Z",
//!     "source": "CMA", "version": "3", "path": "regulation/listing.md" }
//! ] }
//! ```
//!
//! `path` is resolved against the manifest's directory. An entry may carry
//! `content` inline instead.

use super::model::{DocumentCategory, DocumentMetadata, FinancialDocument, Language};
use super::store::DocumentStore;
use crate::error::{ContextError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    documents: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    category: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    content: Option<String>,
}

/// Reads a manifest and feeds its documents into a store
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    manifest_path: PathBuf,
}

impl DocumentLoader {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    /// Load every readable entry; returns how many were added
    pub fn load_into(&self, store: &mut DocumentStore) -> Result<usize> {
        let raw = std::fs::read_to_string(&self.manifest_path)?;
        let base = self
            .manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let loaded = Self::load_str(&raw, &base, store)?;

        info!(
            manifest = %self.manifest_path.display(),
            loaded,
            "document corpus loaded"
        );
        Ok(loaded)
    }

    /// Load from manifest text, resolving paths against `base`
    pub fn load_str(raw: &str, base: &Path, store: &mut DocumentStore) -> Result<usize> {
        let manifest: Manifest = serde_json::from_str(raw)?;
        let now = store.now();

        let mut loaded = 0;
        for entry in manifest.documents {
            let id = entry.id.clone();
            match Self::build(entry, base, now) {
                Ok(document) => {
                    store.add_document(document);
                    loaded += 1;
                }
                Err(e) => warn!(id = %id, error = %e, "skipping document"),
            }
        }
        Ok(loaded)
    }

    fn build(entry: ManifestEntry, base: &Path, now: DateTime<Utc>) -> Result<FinancialDocument> {
        let category: DocumentCategory = entry.category.parse()?;
        let language = entry
            .language
            .as_deref()
            .map_or(Ok(Language::En), str::parse::<Language>)?;

        let path = entry.path.map(|p| base.join(p)).unwrap_or_default();
        let content = match entry.content {
            Some(content) => content,
            None if path.as_os_str().is_empty() => {
                return Err(ContextError::Validation(
                    "entry has neither content nor path".to_string(),
                ));
            }
            None => std::fs::read_to_string(&path)?,
        };

        Ok(FinancialDocument {
            metadata: DocumentMetadata {
                title: entry.title.unwrap_or_else(|| entry.id.clone()),
                id: entry.id,
                category,
                tags: entry.tags.into_iter().collect(),
                language,
                last_updated: entry.last_updated.unwrap_or(now),
                source: entry.source.unwrap_or_default(),
                version: entry.version.unwrap_or_else(|| "1".to_string()),
            },
            content,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_inline_and_skip_bad_entries() {
        let raw = r#"{
            "documents": [
                {"id": "a", "title": "Aramco profile", "category": "profile",
                 "tags": ["2222"], "content": "Aramco is an energy company"},
                {"id": "b", "category": "gossip", "content": "x"},
                {"id": "c", "category": "research", "path": "does/not/exist.md"},
                {"id": "d", "category": "research"},
                {"id": "e", "category": "regulation", "language": "ar", "content": "نص"}
            ]
        }"#;

        let mut store = DocumentStore::new();
        let loaded = DocumentLoader::load_str(raw, Path::new("/nonexistent"), &mut store).unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(store.get("a").unwrap().metadata.title, "Aramco profile");
        assert_eq!(store.get("e").unwrap().metadata.language, Language::Ar);
        assert_eq!(store.get("e").unwrap().metadata.title, "e");
        assert!(store.get("b").is_none());
    }

    #[test]
    fn test_load_from_files() {
        let dir = std::env::temp_dir().join(format!("tadawul-docs-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("research")).unwrap();
        std::fs::write(dir.join("research/banks.md"), "Saudi banks keep growing").unwrap();
        std::fs::write(
            dir.join("manifest.json"),
            r#"{"documents":[{"id":"banks","category":"research","path":"research/banks.md",
                "last_updated":"2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();

        let mut store = DocumentStore::new();
        let loaded = DocumentLoader::new(dir.join("manifest.json"))
            .load_into(&mut store)
            .unwrap();

        assert_eq!(loaded, 1);
        let doc = store.get("banks").unwrap();
        assert_eq!(doc.content, "Saudi banks keep growing");
        assert_eq!(doc.path, dir.join("research/banks.md"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let mut store = DocumentStore::new();
        let result = DocumentLoader::new("/definitely/not/here.json").load_into(&mut store);
        assert!(matches!(result, Err(ContextError::Io(_))));
    }
}
