pub mod blacklist;
pub mod config;
pub mod distance;
pub mod engine;
pub mod error;
pub mod persist;
pub mod query;
pub mod store;
pub mod terms;
pub mod tokenizer;

use serde::{Deserialize, Serialize};

pub use config::EngineConfig;
pub use engine::{Engine, IndexStats};
pub use error::{Error, Result};
pub use query::{Query, QueryError};

pub type TermId = u32;
pub type DocId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,
    pub source_reference: String,
    /// Leading excerpt of the content, at most `EngineConfig::preview_chars` characters.
    pub preview: String,
    pub active: bool,
    /// Relative path of the compressed full content, e.g. docs/0001/0042.gz
    pub content_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: DocId,
    pub hits: u32,
}

/// An already-extracted document handed to the engine for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub source_reference: String,
    pub content: String,
}

impl NewDocument {
    pub fn new(
        title: impl Into<String>,
        source_reference: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            source_reference: source_reference.into(),
            content: content.into(),
        }
    }
}
