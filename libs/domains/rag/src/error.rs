use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid request body")]
    InvalidRequestBody,

    #[error("query field is missing")]
    MissingQuery,

    #[error("process failed")]
    ProcessFailed,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Completion error: {0}")]
    Completion(String),

    /// Non-success answer from a remote API, relayed with its status and body
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: serde_json::Value },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RagResult<T> = Result<T, RagError>;

impl RagError {
    /// Relay a failed remote answer; bodies that are not JSON become `{"error": text}`
    pub fn upstream(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "error": text }))
        };
        RagError::Upstream { status, body }
    }
}

impl From<mongodb::error::Error> for RagError {
    fn from(err: mongodb::error::Error) -> Self {
        RagError::Database(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for RagError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        RagError::Database(format!("BSON decode error: {}", err))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Internal(format!("JSON error: {}", err))
    }
}

/// Convert RagError to AppError for standardized HTTP error responses
impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidRequestBody | RagError::MissingQuery | RagError::ProcessFailed => {
                AppError::BadRequest(err.to_string())
            }
            RagError::Upstream { status, body } => AppError::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            },
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
