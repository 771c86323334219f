use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use lattice_core::{api_types::ErrorBody, LatticeError};

/// Wraps `LatticeError` so handlers can use `?` and still emit the typed
/// error body.
pub struct ApiError(pub LatticeError);

impl From<LatticeError> for ApiError {
    fn from(e: LatticeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            "validation" => StatusCode::BAD_REQUEST,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "provider" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind, error = %self.0, "request failed");
        } else {
            tracing::warn!(kind, error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: kind.to_string(),
            detail: None,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (LatticeError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (LatticeError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (LatticeError::Conflict("locked".into()), StatusCode::CONFLICT),
            (
                LatticeError::provider("anthropic", "down"),
                StatusCode::BAD_GATEWAY,
            ),
            (
                LatticeError::Graph("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
