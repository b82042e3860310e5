//! Financial document corpus: model, index and loader

mod loader;
mod model;
mod store;

pub use loader::DocumentLoader;
pub use model::{
    DocumentCategory, DocumentMetadata, DocumentQuery, DocumentSearchResult, FinancialDocument,
    Language,
};
pub use store::DocumentStore;
