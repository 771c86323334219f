pub mod agent;
pub mod api_types;
pub mod config;
pub mod document;
pub mod entity;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod retrieval;
pub mod staging;
pub mod vector;

pub use agent::{AgentEvent, QueryIntent};
pub use config::AppConfig;
pub use document::{Chunk, ChunkConfig, ChunkMethod, Document};
pub use entity::{
    edge_kind_for_position, normalize_name, CompanyEntity, EdgeKind, EntityKind, ExtractedEntity,
    PersonEntity, TypedEdge,
};
pub use error::{LatticeError, Result};
pub use extraction::{
    estimate_tokens, ChunkExtractionError, Embedder, EntityExtractor, ExtractionConfig,
    ExtractionOutput, ScoredEntity,
};
pub use graph::{CypherResult, FactRecord, GraphQuery, GraphStore, Neighborhood, NodeRecord};
pub use retrieval::{GraphEdgePayload, GraphNodePayload, RetrievalMethod, RetrievedFact, Subgraph};
pub use staging::{
    ItemEdit, ItemKind, ItemPayload, ItemStatus, SessionStatistics, SessionStatus, StagingItem,
    StagingSession, StatusCounts,
};
pub use vector::{ChunkPoint, VectorHit, VectorStore};
