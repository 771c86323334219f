use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        // Ingestion
        .route("/api/ingest", post(handlers::ingest::ingest_document))
        // Staging
        .route("/api/staging/sessions", get(handlers::staging::list_sessions))
        .route(
            "/api/staging/sessions/{id}",
            get(handlers::staging::get_session).delete(handlers::staging::discard_session),
        )
        .route(
            "/api/staging/sessions/{id}/items",
            get(handlers::staging::list_items),
        )
        .route(
            "/api/staging/sessions/{id}/approve_all",
            post(handlers::staging::approve_all),
        )
        .route(
            "/api/staging/sessions/{id}/reject_pending",
            post(handlers::staging::reject_pending),
        )
        .route(
            "/api/staging/sessions/{id}/commit",
            post(handlers::staging::commit_session),
        )
        .route("/api/staging/items/{id}", patch(handlers::staging::update_item))
        .route(
            "/api/staging/items/{id}/transition",
            post(handlers::staging::transition_item),
        )
        // Chat
        .route("/api/chat", post(handlers::chat::chat))
        // Graph
        .route("/api/graph/query", post(handlers::graph::query_graph))
        .route("/api/graph/stats", get(handlers::graph::graph_stats))
}
