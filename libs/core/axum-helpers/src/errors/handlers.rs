use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::ErrorResponse;

/// Router fallback for unknown paths
pub async fn not_found() -> Response {
    let body = Json(ErrorResponse::new("The requested resource was not found"));
    (StatusCode::NOT_FOUND, body).into_response()
}
