pub mod handlers;
pub mod responses;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// JSON body returned by every failing route.
///
/// ```json
/// { "status": "failed", "error": "query field is missing" }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `"failed"`
    pub status: String,
    /// Free-text description of what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            status: "failed".to_string(),
            error: error.into(),
        }
    }
}

/// Application error type that can be converted to HTTP responses
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    /// A remote service answered with an error; status and body are relayed as-is
    #[error("Upstream responded with {status}")]
    Upstream {
        status: StatusCode,
        body: serde_json::Value,
    },

    #[error("Internal Server Error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => {
                tracing::info!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg))
            }
            AppError::Upstream { status, body } => {
                tracing::warn!(%status, "Relaying upstream error");
                return (status, Json(body)).into_response();
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg))
            }
        };

        (status, Json(body)).into_response()
    }
}
