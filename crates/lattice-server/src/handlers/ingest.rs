use axum::{extract::State, Json};
use tracing::info;

use lattice_core::api_types::{IngestRequest, IngestResponse};
use lattice_core::{ChunkConfig, ExtractionConfig, LatticeError};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let text = match (&request.text, &request.document_path) {
        (Some(_), Some(_)) => {
            return Err(LatticeError::Validation(
                "provide either text or document_path, not both".into(),
            )
            .into());
        }
        (Some(text), None) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path).await.map_err(|e| {
            LatticeError::Validation(format!("cannot read document at {path}: {e}"))
        })?,
        (None, None) => {
            return Err(
                LatticeError::Validation("either text or document_path is required".into()).into(),
            );
        }
    };

    if request.title.trim().is_empty() {
        return Err(LatticeError::Validation("title must not be empty".into()).into());
    }

    let chunk_config = request.chunk_config.unwrap_or_default();
    let extraction_config = request.extraction_config.unwrap_or_default();

    info!(title = %request.title, source = %request.source, chars = text.len(), "Ingesting document");

    let report = state
        .pipeline
        .ingest(
            &text,
            request.title,
            request.source,
            &chunk_config,
            &extraction_config,
        )
        .await?;

    Ok(Json(IngestResponse {
        session_id: report.session.id,
        document_id: report.document.id,
        chunk_count: report.chunk_count,
        entity_count: report.entity_count,
        relationship_count: report.relationship_count,
        extraction_errors: report.extraction_errors,
    }))
}
