use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use lattice_core::api_types::{
    BulkTransitionResponse, CommitResponse, ItemListQuery, ItemListResponse, ItemResponse,
    SessionDetailResponse, SessionListResponse, TransitionRequest, UpdateItemRequest,
};

use crate::error::ApiError;
use crate::state::AppState;

// Store operations run on the blocking pool: lock acquisition polls with
// thread sleeps and must stay off the async workers.

pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.staging.run_blocking(|s| s.list_sessions()).await?;
    Ok(Json(SessionListResponse { sessions }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let session = state.staging.run_blocking(move |s| s.get_session(id)).await?;
    Ok(Json(SessionDetailResponse { session }))
}

pub async fn list_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ItemListQuery>,
) -> Result<Json<ItemListResponse>, ApiError> {
    let (items, total) = state
        .staging
        .run_blocking(move |s| {
            s.list_items(id, params.status, params.kind, params.limit, params.offset)
        })
        .await?;
    Ok(Json(ItemListResponse { items, total }))
}

pub async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item = state
        .staging
        .run_blocking(move |s| {
            let (session_id, _) = s.find_item(id)?;
            let item = s.update_item(session_id, id, request.edits)?;
            info!(item_id = %id, session_id = %session_id, "Updated staging item");
            Ok(item)
        })
        .await?;
    Ok(Json(ItemResponse { item }))
}

pub async fn transition_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item = state
        .staging
        .run_blocking(move |s| {
            let (session_id, _) = s.find_item(id)?;
            s.transition(session_id, &[id], request.to)?;
            let (_, item) = s.find_item(id)?;
            Ok(item)
        })
        .await?;
    info!(item_id = %id, to = ?request.to, "Transitioned staging item");
    Ok(Json(ItemResponse { item }))
}

pub async fn approve_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BulkTransitionResponse>, ApiError> {
    let (affected, statistics) = state
        .staging
        .run_blocking(move |s| s.bulk_approve_all(id))
        .await?;
    info!(session_id = %id, affected, "Approved all pending items");
    Ok(Json(BulkTransitionResponse {
        affected,
        statistics,
    }))
}

pub async fn reject_pending(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BulkTransitionResponse>, ApiError> {
    let (affected, statistics) = state
        .staging
        .run_blocking(move |s| s.bulk_reject_pending(id))
        .await?;
    info!(session_id = %id, affected, "Rejected all pending items");
    Ok(Json(BulkTransitionResponse {
        affected,
        statistics,
    }))
}

pub async fn commit_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommitResponse>, ApiError> {
    info!(session_id = %id, "Committing staging session");
    let (status, results, statistics) = state.staging.commit(id, state.graph.as_ref()).await?;
    Ok(Json(CommitResponse {
        session_id: id,
        status,
        results,
        statistics,
    }))
}

pub async fn discard_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.staging.run_blocking(move |s| s.discard(id)).await?;
    info!(session_id = %id, "Discarded staging session");
    Ok(StatusCode::NO_CONTENT)
}
