use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use lattice_core::api_types::HealthResponse;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Health check requested");

    let (graph_ok, vector_ok) = tokio::join!(state.graph.ping(), state.vectors.ping());

    let status = if graph_ok && vector_ok {
        "ok".to_string()
    } else {
        "degraded".to_string()
    };

    let response = HealthResponse {
        status,
        version: VERSION.to_string(),
        api_ok: true,
        graph_ok,
        vector_ok,
    };

    (StatusCode::OK, Json(response))
}
