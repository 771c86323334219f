use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ingested source document. Immutable once created; chunks reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl Document {
    pub fn new(title: String, source: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            source,
            created_at: Utc::now(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// A bounded contiguous span of a document with a stable ordinal.
///
/// `overlap_len` counts leading characters copied from the previous chunk
/// as context; stripping them in ordinal order reconstructs the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub ordinal: usize,
    pub text: String,
    pub char_count: usize,
    pub char_offset: usize,
    #[serde(default)]
    pub overlap_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMethod {
    Semantic,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in characters.
    pub target_size: usize,
    /// Trailing characters of the previous chunk prepended to the next
    /// (semantic method only).
    pub overlap: usize,
    pub method: ChunkMethod,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_size: 1200,
            overlap: 120,
            method: ChunkMethod::Semantic,
        }
    }
}
