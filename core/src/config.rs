use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of content blobs per bucket directory.
    pub bucket_size: u32,
    /// Length of the stored preview, in characters.
    pub preview_chars: usize,
    /// Suggestions must be strictly closer than this edit distance.
    pub suggest_distance: usize,
    /// Keep the compressed full content next to the metadata.
    pub store_content: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { bucket_size: 1000, preview_chars: 1000, suggest_distance: 3, store_content: true }
    }
}
