use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::ChunkConfig;
use crate::extraction::ExtractionConfig;
use crate::retrieval::{GraphEdgePayload, GraphNodePayload};
use crate::staging::{ItemKind, ItemStatus, SessionStatistics, SessionStatus, StagingItem, StagingSession};

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub api_ok: bool,
    pub graph_ok: bool,
    pub vector_ok: bool,
}

// --- Ingestion ---

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document_path: Option<String>,
    pub title: String,
    pub source: String,
    #[serde(default)]
    pub chunk_config: Option<ChunkConfig>,
    #[serde(default)]
    pub extraction_config: Option<ExtractionConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub session_id: Uuid,
    pub document_id: Uuid,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub extraction_errors: usize,
}

// --- Staging ---

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<StagingSession>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDetailResponse {
    pub session: StagingSession,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemListQuery {
    pub status: Option<ItemStatus>,
    pub kind: Option<ItemKind>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemListResponse {
    pub items: Vec<StagingItem>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    pub edits: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: ItemStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: StagingItem,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkTransitionResponse {
    pub affected: usize,
    pub statistics: SessionStatistics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitItemResult {
    pub item_id: Uuid,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub results: Vec<CommitItemResult>,
    pub statistics: SessionStatistics,
}

// --- Chat ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

// --- Graph ---

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphQueryRequest {
    pub cypher: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphQueryResponse {
    pub nodes: Vec<GraphNodePayload>,
    pub relationships: Vec<GraphEdgePayload>,
    pub rows: serde_json::Value,
    pub query_time_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphStatsResponse {
    pub node_count: u64,
    pub edge_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
