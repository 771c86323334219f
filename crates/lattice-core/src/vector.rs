use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// One embedded chunk ready for upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPoint {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub ordinal: usize,
    pub text: String,
    pub document_title: String,
    pub document_source: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub ordinal: usize,
    pub text: String,
    pub document_title: String,
    pub document_source: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self) -> Result<()>;
    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()>;
    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<VectorHit>>;
    async fn ping(&self) -> bool;
}
