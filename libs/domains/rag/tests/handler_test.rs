//! Handler tests for the RAG domain
//!
//! The router runs against in-memory stores so these tests cover request
//! parsing, status codes and response bodies without MongoDB or OpenAI.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain_rag::{
    AnswerSynthesizer, EmbeddingModel, EmbeddingProvider, Namespace, OpenAIConfig,
    OpenAIProvider, RagError, RagResult, RagService, Record, RecordRepository, ScoredDocument,
    SearchIndexAdmin, SearchIndexDefinition, VectorDocument, VectorStore, handlers,
};
use http_body_util::BodyExt;
use mongodb::bson::Bson;
use serde_json::{Value, json};
use test_utils::TestDataBuilder;
use tower::ServiceExt; // For oneshot()

/// Records keyed by collection; updates of `stuck_id` modify nothing
#[derive(Default)]
struct InMemoryRecords {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    stuck_id: Option<Bson>,
}

impl InMemoryRecords {
    fn with_collection(collection: &str, records: Vec<Record>) -> Self {
        let store = Self::default();
        store
            .collections
            .lock()
            .unwrap()
            .insert(collection.to_string(), records);
        store
    }

    fn stuck_on(mut self, id: Bson) -> Self {
        self.stuck_id = Some(id);
        self
    }

    fn processed_flags(&self, collection: &str) -> Vec<(Bson, bool)> {
        self.collections.lock().unwrap()[collection]
            .iter()
            .map(|record| (record.id.clone(), record.processed))
            .collect()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecords {
    async fn find_unprocessed(&self, collection: &str) -> RagResult<Option<Vec<Record>>> {
        Ok(self.collections.lock().unwrap().get(collection).map(|records| {
            records
                .iter()
                .filter(|record| !record.processed)
                .cloned()
                .collect()
        }))
    }

    async fn mark_processed(&self, collection: &str, id: &Bson) -> RagResult<u64> {
        if self.stuck_id.as_ref() == Some(id) {
            return Ok(0);
        }

        let mut collections = self.collections.lock().unwrap();
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|record| &record.id == id))
        else {
            return Ok(0);
        };

        let modified = u64::from(!record.processed);
        record.processed = true;
        Ok(modified)
    }
}

struct FixedEmbeddings;

#[async_trait]
impl EmbeddingProvider for FixedEmbeddings {
    fn model(&self) -> EmbeddingModel {
        EmbeddingModel::TextEmbeddingAda002
    }

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        Ok(vec![text.len() as f32, 1.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| vec![text.len() as f32, 1.0]).collect())
    }
}

/// Stores documents per vector collection and returns them all on search
#[derive(Default)]
struct InMemoryVectors {
    collections: Mutex<HashMap<String, Vec<VectorDocument>>>,
}

impl InMemoryVectors {
    fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectors {
    async fn add(&self, namespace: &Namespace, docs: Vec<VectorDocument>) -> RagResult<usize> {
        let count = docs.len();
        self.collections
            .lock()
            .unwrap()
            .entry(namespace.vector_collection.clone())
            .or_default()
            .extend(docs);
        Ok(count)
    }

    async fn search(
        &self,
        namespace: &Namespace,
        _embedding: Vec<f32>,
        top_k: usize,
    ) -> RagResult<Vec<ScoredDocument>> {
        Ok(self
            .collections
            .lock()
            .unwrap()
            .get(&namespace.vector_collection)
            .map(|docs| {
                docs.iter()
                    .take(top_k)
                    .map(|doc| ScoredDocument {
                        text: doc.text.clone(),
                        metadata: Some(doc.metadata.clone()),
                        score: 1.0,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Answers with the retrieved texts joined, or the empty marker
struct EchoSynthesizer;

#[async_trait]
impl AnswerSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, _query: &str, docs: &[ScoredDocument]) -> RagResult<String> {
        if docs.is_empty() {
            return Ok("Empty Response".to_string());
        }
        Ok(docs
            .iter()
            .map(|doc| doc.text.as_str())
            .collect::<Vec<_>>()
            .join(" | "))
    }
}

/// Admin API that already has every index
struct DuplicateIndexAdmin;

#[async_trait]
impl SearchIndexAdmin for DuplicateIndexAdmin {
    async fn create_search_index(&self, definition: &SearchIndexDefinition) -> RagResult<Value> {
        Err(RagError::Upstream {
            status: 409,
            body: json!({
                "errorCode": "ATLAS_FTS_DUPLICATE_INDEX",
                "detail": format!("Index {} already exists", definition.name),
            }),
        })
    }

    async fn list_search_indexes(&self, database: &str, collection: &str) -> RagResult<Value> {
        Ok(json!([{
            "database": database,
            "collectionName": collection,
            "name": format!("{collection}_index"),
        }]))
    }
}

fn record(id: i32, text: &str, processed: bool) -> Record {
    Record {
        id: Bson::Int32(id),
        text: text.to_string(),
        processed,
    }
}

fn app(records: Arc<InMemoryRecords>, vectors: Arc<InMemoryVectors>) -> Router {
    let service = RagService::new(
        records,
        Arc::new(FixedEmbeddings),
        vectors,
        Arc::new(EchoSynthesizer),
        "invoices",
    )
    .with_admin(Arc::new(DuplicateIndexAdmin));
    handlers::router(service)
}

fn empty_app() -> Router {
    app(
        Arc::new(InMemoryRecords::default()),
        Arc::new(InMemoryVectors::default()),
    )
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

// Helper to parse JSON response body
async fn json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_says_hello() {
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let response = empty_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "status": "success", "message": "hello world" })
    );
}

#[tokio::test]
async fn test_query_without_query_field_returns_400() {
    let response = empty_app()
        .oneshot(post_json("/query", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "status": "failed", "error": "query field is missing" })
    );
}

#[tokio::test]
async fn test_process_without_user_id_returns_400() {
    let response = empty_app()
        .oneshot(post_json("/process", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "status": "failed", "error": "invalid request body" })
    );
}

#[tokio::test]
async fn test_process_with_malformed_body_returns_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/process")
        .header("content-type", "application/json")
        .body(Body::from("{\"user_id\":"))
        .unwrap();

    let response = empty_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["error"], "invalid request body");
}

#[tokio::test]
async fn test_process_for_unknown_user_fails() {
    let builder = TestDataBuilder::from_test_name("process_unknown_user");

    let response = empty_app()
        .oneshot(post_json("/process", json!({ "user_id": builder.user_email() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "status": "failed", "error": "process failed" })
    );
}

#[tokio::test]
async fn test_process_flags_every_unprocessed_record() {
    let records = Arc::new(InMemoryRecords::with_collection(
        "alice_invoice",
        vec![
            record(1, "Invoice 1: 20 EUR", false),
            record(2, "Invoice 2: 35 EUR", false),
            record(3, "Invoice 0: already indexed", true),
        ],
    ));
    let vectors = Arc::new(InMemoryVectors::default());

    let response = app(records.clone(), vectors.clone())
        .oneshot(post_json("/process", json!({ "user_id": "alice@example.com" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "status": "success", "message": "process successful" })
    );
    assert!(
        records
            .processed_flags("alice_invoice")
            .iter()
            .all(|(_, processed)| *processed)
    );
    // The already processed record is neither re-embedded nor counted
    assert_eq!(vectors.count("alice_invoice_vector"), 2);
}

#[tokio::test]
async fn test_process_partial_failure_keeps_earlier_updates() {
    let records = Arc::new(
        InMemoryRecords::with_collection(
            "bob_invoice",
            vec![
                record(1, "first", false),
                record(2, "second", false),
                record(3, "third", false),
            ],
        )
        .stuck_on(Bson::Int32(2)),
    );

    let response = app(records.clone(), Arc::new(InMemoryVectors::default()))
        .oneshot(post_json("/process", json!({ "user_id": "bob@example.com" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        records.processed_flags("bob_invoice"),
        vec![
            (Bson::Int32(1), true),
            (Bson::Int32(2), false),
            (Bson::Int32(3), false),
        ]
    );
}

#[tokio::test]
async fn test_query_answers_from_processed_records() {
    let records = Arc::new(InMemoryRecords::with_collection(
        "alice_invoice",
        vec![record(1, "ACME billed 40 EUR", false)],
    ));
    let vectors = Arc::new(InMemoryVectors::default());
    let router = app(records, vectors);

    let response = router
        .clone()
        .oneshot(post_json("/process", json!({ "user_id": "alice@example.com" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(post_json(
            "/query",
            json!({ "query": "Who billed me?", "user_id": "alice@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "response": "ACME billed 40 EUR" })
    );
}

#[tokio::test]
async fn test_query_with_nothing_indexed_gives_empty_response() {
    let response = empty_app()
        .oneshot(post_json(
            "/query",
            json!({ "query": "anything?", "user_id": "carol@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["response"], "Empty Response");
}

#[tokio::test]
async fn test_create_index_conflict_is_relayed() {
    let response = empty_app()
        .oneshot(post_json("/create_index", json!({ "user_id": "a.b@x.com" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({
            "errorCode": "ATLAS_FTS_DUPLICATE_INDEX",
            "detail": "Index a_b_invoice_vector_index already exists",
        })
    );
}

#[tokio::test]
async fn test_list_indexes_relays_payload() {
    let request = Request::builder()
        .uri("/list_indexes/invoices/alice_invoice_vector")
        .body(Body::empty())
        .unwrap();

    let response = empty_app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response.into_body()).await;
    assert_eq!(body[0]["collectionName"], "alice_invoice_vector");
    assert_eq!(body[0]["name"], "alice_invoice_vector_index");
}

#[tokio::test]
async fn test_create_index_without_admin_returns_500() {
    let service = RagService::new(
        Arc::new(InMemoryRecords::default()),
        Arc::new(FixedEmbeddings),
        Arc::new(InMemoryVectors::default()),
        Arc::new(EchoSynthesizer),
        "invoices",
    );

    let response = handlers::router(service)
        .oneshot(post_json("/create_index", json!({ "user_id": "alice@example.com" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response.into_body()).await;
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn test_query_relays_embedding_rate_limit() {
    let openai = Router::new().route(
        "/v1/embeddings",
        axum::routing::post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(json!({ "error": { "message": "Rate limit reached" } })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, openai).await.unwrap() });

    let embeddings =
        OpenAIProvider::new(OpenAIConfig::new("sk-test").with_base_url(format!("http://{addr}/v1")));
    let service = RagService::new(
        Arc::new(InMemoryRecords::default()),
        Arc::new(embeddings),
        Arc::new(InMemoryVectors::default()),
        Arc::new(EchoSynthesizer),
        "invoices",
    );

    let response = handlers::router(service)
        .oneshot(post_json(
            "/query",
            json!({ "query": "q", "user_id": "a@b.c" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        json_body(response.into_body()).await,
        json!({ "error": { "message": "Rate limit reached" } })
    );
}
