use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    GraphSearch,
    VectorSearch,
    EntitySearch,
    EntityRelationships,
}

/// The one record shape every retrieval tool returns, regardless of the
/// underlying store's row format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedFact {
    pub fact: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub method: RetrievalMethod,
}

/// Node in the visualization payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodePayload {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: serde_json::Value,
}

/// Edge in the visualization payload. Field names follow the web UI's
/// expectations, hence the camelCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdgePayload {
    pub id: String,
    #[serde(rename = "startNodeId")]
    pub start_node_id: String,
    #[serde(rename = "endNodeId")]
    pub end_node_id: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub properties: serde_json::Value,
}

/// The node+edge JSON emitted alongside a chat answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNodePayload>,
    pub edges: Vec<GraphEdgePayload>,
}

impl Subgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn add_node(&mut self, node: GraphNodePayload) {
        if !self.nodes.iter().any(|n| n.id == node.id) {
            self.nodes.push(node);
        }
    }

    pub fn add_edge(&mut self, edge: GraphEdgePayload) {
        if !self.edges.iter().any(|e| e.id == edge.id) {
            self.edges.push(edge);
        }
    }

    /// Merge another subgraph, deduplicating by id.
    pub fn merge(&mut self, other: Subgraph) {
        for node in other.nodes {
            self.add_node(node);
        }
        for edge in other.edges {
            self.add_edge(edge);
        }
    }
}
