use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{ExtractedEntity, TypedEdge};
use crate::error::Result;
use crate::retrieval::{GraphEdgePayload, GraphNodePayload};

#[derive(Debug, Clone)]
pub struct GraphQuery {
    pub cypher: String,
    pub params: serde_json::Value,
}

/// A node row returned by entity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub name: String,
    pub labels: Vec<String>,
    pub summary: String,
    pub properties: serde_json::Value,
}

impl NodeRecord {
    pub fn into_payload(self) -> GraphNodePayload {
        GraphNodePayload {
            id: self.id,
            labels: self.labels,
            properties: self.properties,
        }
    }
}

/// An edge row with its endpoints, ready for both fact context and the
/// visualization payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRecord {
    pub edge: GraphEdgePayload,
    pub fact_text: String,
    pub source_name: String,
    pub target_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub nodes: Vec<GraphNodePayload>,
}

/// Direct (and optionally 2-hop) edges around a matched entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighborhood {
    pub center: NodeRecord,
    pub facts: Vec<FactRecord>,
}

/// Raw query rows plus any nodes and relationships found in the result
/// columns, ready for visualization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CypherResult {
    pub nodes: Vec<GraphNodePayload>,
    pub relationships: Vec<GraphEdgePayload>,
    pub rows: serde_json::Value,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Merge one entity on its normalized name; attribute union on match.
    async fn merge_entity(&self, entity: &ExtractedEntity) -> Result<()>;
    /// Merge one edge on (kind, source, target, valid_at), creating
    /// placeholder endpoints when missing.
    async fn merge_edge(&self, edge: &TypedEdge) -> Result<()>;
    /// Full-text match over edge fact text, ranked by lexical score.
    async fn search_facts(&self, query: &str, limit: usize) -> Result<Vec<FactRecord>>;
    /// Case-insensitive substring match over node names.
    async fn search_entities(&self, name: &str, limit: usize) -> Result<Vec<NodeRecord>>;
    /// Edges around the best name match; `hops` is 1 or 2.
    async fn entity_relationships(&self, name: &str, hops: u8) -> Result<Neighborhood>;
    async fn execute_cypher(&self, query: &GraphQuery) -> Result<serde_json::Value>;
    /// Like `execute_cypher`, additionally pulling node and relationship
    /// columns out of the rows. Stores without typed row access return the
    /// rows alone.
    async fn query_graph(&self, query: &GraphQuery) -> Result<CypherResult> {
        Ok(CypherResult {
            nodes: Vec::new(),
            relationships: Vec::new(),
            rows: self.execute_cypher(query).await?,
        })
    }
    async fn node_count(&self) -> Result<u64>;
    async fn edge_count(&self) -> Result<u64>;
    async fn ping(&self) -> bool;
}
