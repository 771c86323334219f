use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::Chunk;
use crate::entity::{ExtractedEntity, TypedEdge};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub enable_person: bool,
    pub enable_company: bool,
    pub enable_relationships: bool,
    /// Items scoring below this are kept but flagged for the reviewer.
    pub min_confidence: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enable_person: true,
            enable_company: true,
            enable_relationships: true,
            min_confidence: 0.5,
        }
    }
}

/// An extracted entity with its model-reported confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntity {
    pub entity: ExtractedEntity,
    pub confidence: f64,
    pub low_confidence: bool,
}

/// A chunk whose extraction failed schema validation twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkExtractionError {
    pub ordinal: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub entities: Vec<ScoredEntity>,
    pub relationships: Vec<TypedEdge>,
    pub errors: Vec<ChunkExtractionError>,
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract typed entities and relationships from ordered chunks,
    /// merging duplicates by normalized name across the whole set.
    async fn extract(&self, chunks: &[Chunk], config: &ExtractionConfig)
        -> Result<ExtractionOutput>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dim(&self) -> usize;
}

/// Deterministic token estimate, ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
