use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
};
use axum_helpers::errors::responses::{BadRequestResponse, InternalServerErrorResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::{RagError, RagResult};
use crate::models::{
    CreateIndexRequest, ProcessRequest, QueryRequest, QueryResponse, StatusResponse,
};
use crate::service::RagService;

/// OpenAPI documentation for the RAG API
#[derive(OpenApi)]
#[openapi(
    paths(root, process, query, create_index, list_indexes),
    components(
        schemas(ProcessRequest, QueryRequest, QueryResponse, CreateIndexRequest, StatusResponse),
        responses(BadRequestResponse, InternalServerErrorResponse)
    ),
    tags(
        (name = "RAG", description = "Embedding, retrieval and answer synthesis"),
        (name = "Indexes", description = "Atlas search index administration")
    )
)]
pub struct ApiDoc;

/// Create the RAG router with all HTTP endpoints
pub fn router(service: RagService) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/process", post(process))
        .route("/query", post(query))
        .route("/create_index", post(create_index))
        .route(
            "/list_indexes/{database_name}/{collection_name}",
            get(list_indexes),
        )
        .with_state(Arc::new(service))
}

/// Decode a JSON body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> RagResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        RagError::InvalidRequestBody
    })
}

/// Liveness greeting
#[utoipa::path(
    get,
    path = "/",
    tag = "RAG",
    responses(
        (status = 200, description = "Service is up", body = StatusResponse)
    )
)]
async fn root() -> Json<StatusResponse> {
    Json(StatusResponse::success("hello world"))
}

/// Embed every unprocessed record of the user and mark it processed
#[utoipa::path(
    post,
    path = "/process",
    tag = "RAG",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "All records processed", body = StatusResponse),
        (status = 400, response = BadRequestResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn process(
    State(service): State<Arc<RagService>>,
    body: Bytes,
) -> RagResult<Json<StatusResponse>> {
    let request: ProcessRequest = parse_body(&body)?;

    let outcome = service.process(request.user_id.as_deref()).await?;
    if !outcome.is_success() {
        return Err(RagError::ProcessFailed);
    }

    Ok(Json(StatusResponse::success("process successful")))
}

/// Answer a question from the user's embedded records
#[utoipa::path(
    post,
    path = "/query",
    tag = "RAG",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Synthesized answer", body = QueryResponse),
        (status = 400, response = BadRequestResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn query(
    State(service): State<Arc<RagService>>,
    body: Bytes,
) -> RagResult<Json<QueryResponse>> {
    let request: QueryRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        RagError::InvalidRequestBody
    })?;
    let query = request.query.ok_or(RagError::MissingQuery)?;

    let response = service.query(request.user_id.as_deref(), &query).await?;
    Ok(Json(QueryResponse { response }))
}

/// Provision the vector search index for the user's vector collection
#[utoipa::path(
    post,
    path = "/create_index",
    tag = "Indexes",
    request_body = CreateIndexRequest,
    responses(
        (status = 200, description = "Remote payload, unchanged"),
        (status = 400, response = BadRequestResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn create_index(
    State(service): State<Arc<RagService>>,
    body: Bytes,
) -> RagResult<Json<Value>> {
    let request: CreateIndexRequest = parse_body(&body)?;
    let created = service.create_index(request.user_id.as_deref()).await?;
    Ok(Json(created))
}

/// List the search indexes of one collection
#[utoipa::path(
    get,
    path = "/list_indexes/{database_name}/{collection_name}",
    tag = "Indexes",
    params(
        ("database_name" = String, Path, description = "Database name"),
        ("collection_name" = String, Path, description = "Collection name")
    ),
    responses(
        (status = 200, description = "Remote payload, unchanged"),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_indexes(
    State(service): State<Arc<RagService>>,
    Path((database_name, collection_name)): Path<(String, String)>,
) -> RagResult<Json<Value>> {
    let indexes = service
        .list_indexes(&database_name, &collection_name)
        .await?;
    Ok(Json(indexes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_reads_as_default() {
        let request: ProcessRequest = parse_body(&Bytes::new()).unwrap();
        assert!(request.user_id.is_none());
    }

    #[test]
    fn test_malformed_body_is_invalid() {
        let result: RagResult<ProcessRequest> = parse_body(&Bytes::from_static(b"{user_id"));
        assert!(matches!(result, Err(RagError::InvalidRequestBody)));
    }

    #[test]
    fn test_body_with_user_id() {
        let request: ProcessRequest =
            parse_body(&Bytes::from_static(br#"{"user_id":"alice@example.com"}"#)).unwrap();
        assert_eq!(request.user_id.as_deref(), Some("alice@example.com"));
    }
}
