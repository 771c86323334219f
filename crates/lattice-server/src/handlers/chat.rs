use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;
use uuid::Uuid;

use lattice_core::api_types::ChatRequest;
use lattice_core::{AgentEvent, LatticeError};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(LatticeError::Validation("message must not be empty".into()).into());
    }

    let session_id = match &request.session_id {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
            LatticeError::Validation(format!("invalid session_id: {raw}"))
        })?),
        None => None,
    };

    info!(session_id = ?session_id, "Starting chat stream");

    let rx = state.agent.clone().chat(session_id, request.message);
    let stream = ReceiverStream::new(rx).map(|event: AgentEvent| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().data("{\"type\":\"error\",\"message\":\"serialization failed\"}")))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
