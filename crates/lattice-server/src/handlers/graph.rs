use std::time::Instant;

use axum::{extract::State, Json};
use tracing::info;

use lattice_core::api_types::{GraphQueryRequest, GraphQueryResponse, GraphStatsResponse};
use lattice_core::GraphQuery;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn query_graph(
    State(state): State<AppState>,
    Json(request): Json<GraphQueryRequest>,
) -> Result<Json<GraphQueryResponse>, ApiError> {
    let mut cypher = request.cypher;
    if let Some(limit) = request.limit {
        if !cypher.to_lowercase().contains("limit") {
            cypher = format!("{cypher} LIMIT {limit}");
        }
    }

    info!(cypher = %cypher, "Executing graph query");

    let query = GraphQuery {
        cypher,
        params: request.params,
    };

    let started = Instant::now();
    let result = state.graph.query_graph(&query).await?;
    let query_time_ms = started.elapsed().as_millis() as u64;

    Ok(Json(GraphQueryResponse {
        nodes: result.nodes,
        relationships: result.relationships,
        rows: result.rows,
        query_time_ms,
    }))
}

pub async fn graph_stats(
    State(state): State<AppState>,
) -> Result<Json<GraphStatsResponse>, ApiError> {
    let node_count = state.graph.node_count().await?;
    let edge_count = state.graph.edge_count().await?;
    Ok(Json(GraphStatsResponse {
        node_count,
        edge_count,
    }))
}
