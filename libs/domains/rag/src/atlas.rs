//! Atlas administrative API client for search index provisioning.
//!
//! Requests are digest-authenticated: the first attempt goes out without
//! credentials, and a `401` challenge is answered once. Non-success answers
//! are relayed to the caller with their status and body.

use async_trait::async_trait;
use digest_auth::{AuthContext, HttpMethod};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use tracing::instrument;

use crate::config::AtlasAdminConfig;
use crate::error::{RagError, RagResult};
use crate::models::SearchIndexDefinition;

/// Remote management of search indexes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndexAdmin: Send + Sync {
    /// Provision an index, returning the remote payload as-is
    async fn create_search_index(&self, definition: &SearchIndexDefinition) -> RagResult<Value>;

    /// Indexes defined on one collection, as the remote service lists them
    async fn list_search_indexes(&self, database: &str, collection: &str) -> RagResult<Value>;
}

pub struct AtlasAdminClient {
    client: Client,
    config: AtlasAdminConfig,
}

impl AtlasAdminClient {
    pub fn new(config: AtlasAdminConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: AtlasAdminConfig) -> Self {
        Self { client, config }
    }

    /// `{base}/groups/{project}/clusters/{cluster}/fts/indexes[/{extra}...]`
    fn indexes_url(&self, extra: &[&str]) -> RagResult<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| RagError::Config(format!("Invalid ATLAS_API_BASE_URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| RagError::Config("ATLAS_API_BASE_URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "groups",
                self.config.project_id.as_str(),
                "clusters",
                self.config.cluster_name.as_str(),
                "fts",
                "indexes",
            ])
            .extend(extra);

        Ok(url)
    }

    /// `Authorization` header answering a digest challenge
    fn authorization(
        &self,
        challenge: &str,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
    ) -> RagResult<String> {
        let mut prompt = digest_auth::parse(challenge)
            .map_err(|e| RagError::Network(format!("Invalid digest challenge: {}", e)))?;

        let uri = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let http_method = if *method == Method::POST {
            HttpMethod::POST
        } else {
            HttpMethod::GET
        };

        let context = AuthContext::new_with_method(
            self.config.public_key.as_str(),
            self.config.private_key.as_str(),
            uri,
            body,
            http_method,
        );

        let answer = prompt
            .respond(&context)
            .map_err(|e| RagError::Network(format!("Digest authentication failed: {}", e)))?;
        Ok(answer.to_header_string())
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        authorization: Option<String>,
    ) -> RagResult<reqwest::Response> {
        let mut request = self
            .client
            .request(method, url)
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        Ok(request.send().await?)
    }

    async fn execute(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> RagResult<Value> {
        let first = self
            .send(method.clone(), url.clone(), body.clone(), None)
            .await?;

        let response = if first.status() == StatusCode::UNAUTHORIZED {
            let challenge = first
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            match challenge {
                Some(challenge) => {
                    let authorization =
                        self.authorization(&challenge, &method, &url, body.as_deref())?;
                    self.send(method, url, body, Some(authorization)).await?
                }
                None => first,
            }
        } else {
            first
        };

        let status = response.status();
        let text = response.text().await?;
        interpret_response(status, &text)
    }
}

/// Success bodies pass through; failures become [`RagError::Upstream`].
///
/// A success body that is not JSON is returned as a JSON string.
fn interpret_response(status: StatusCode, text: &str) -> RagResult<Value> {
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "Atlas admin request failed");
        return Err(RagError::upstream(status.as_u16(), text));
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

#[async_trait]
impl SearchIndexAdmin for AtlasAdminClient {
    #[instrument(skip(self), fields(index = %definition.name))]
    async fn create_search_index(&self, definition: &SearchIndexDefinition) -> RagResult<Value> {
        let url = self.indexes_url(&[])?;
        let body = serde_json::to_vec(&definition.to_request_body())?;

        let created = self.execute(Method::POST, url, Some(body)).await?;
        tracing::info!("Search index created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list_search_indexes(&self, database: &str, collection: &str) -> RagResult<Value> {
        let url = self.indexes_url(&[database, collection])?;
        self.execute(Method::GET, url, None).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::{Json, Router};
    use serde_json::json;

    use super::*;

    const CHALLENGE: &str =
        r#"Digest realm="MMS Public API", nonce="abc123", algorithm=MD5, qop="auth""#;

    /// Serve `app` on an ephemeral port and return an admin base URL pointing at it
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/api/atlas/v1.0")
    }

    /// Records the `Authorization` header of every request it answers
    fn recording_server(
        seen: Arc<Mutex<Vec<Option<String>>>>,
        challenge: Option<&'static str>,
    ) -> Router {
        Router::new().fallback(move |headers: HeaderMap| {
            let seen = seen.clone();
            async move {
                let authorization = headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                seen.lock().unwrap().push(authorization.clone());

                match (authorization, challenge) {
                    (None, Some(challenge)) => {
                        (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, challenge)]).into_response()
                    }
                    (None, None) => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
                    (Some(_), _) => (
                        StatusCode::CONFLICT,
                        Json(json!({ "errorCode": "ATLAS_FTS_DUPLICATE_INDEX" })),
                    )
                        .into_response(),
                }
            }
        })
    }

    fn client(base_url: &str) -> AtlasAdminClient {
        AtlasAdminClient::new(AtlasAdminConfig {
            base_url: base_url.to_string(),
            project_id: "5f1a".to_string(),
            cluster_name: "Cluster0".to_string(),
            public_key: "public".to_string(),
            private_key: "private".to_string(),
        })
    }

    #[test]
    fn test_create_url() {
        let url = client("https://cloud.mongodb.com/api/atlas/v1.0")
            .indexes_url(&[])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://cloud.mongodb.com/api/atlas/v1.0/groups/5f1a/clusters/Cluster0/fts/indexes"
        );
    }

    #[test]
    fn test_list_url_appends_database_and_collection() {
        let url = client("https://cloud.mongodb.com/api/atlas/v1.0/")
            .indexes_url(&["invoices", "alice_invoice_vector"])
            .unwrap();
        assert!(
            url.as_str()
                .ends_with("/fts/indexes/invoices/alice_invoice_vector")
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        assert!(matches!(
            client("not a url").indexes_url(&[]),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn test_digest_challenge_is_answered() {
        let admin = client("https://cloud.mongodb.com/api/atlas/v1.0");
        let url = admin.indexes_url(&[]).unwrap();
        let header = admin
            .authorization(
                CHALLENGE,
                &Method::POST,
                &url,
                Some(b"{}".as_slice()),
            )
            .unwrap();

        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"username="public""#));
        assert!(header.contains("/api/atlas/v1.0/groups/5f1a/clusters/Cluster0/fts/indexes"));
    }

    #[test]
    fn test_success_body_passes_through() {
        let body = interpret_response(StatusCode::OK, r#"{"indexID":"x1"}"#).unwrap();
        assert_eq!(body["indexID"], "x1");
    }

    #[test]
    fn test_failure_keeps_status_and_json_body() {
        let err = interpret_response(
            StatusCode::CONFLICT,
            r#"{"errorCode":"ATLAS_FTS_DUPLICATE_INDEX"}"#,
        )
        .unwrap_err();

        match err {
            RagError::Upstream { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body["errorCode"], "ATLAS_FTS_DUPLICATE_INDEX");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failure_with_text_body_is_wrapped() {
        let err = interpret_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        match err {
            RagError::Upstream { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, json!({ "error": "upstream down" }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_success_text_body_is_a_json_string() {
        let body = interpret_response(StatusCode::OK, "created").unwrap();
        assert_eq!(body, Value::String("created".to_string()));
    }

    #[tokio::test]
    async fn test_create_answers_challenge_and_relays_conflict() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base_url = serve(recording_server(seen.clone(), Some(CHALLENGE))).await;

        let definition = SearchIndexDefinition::new(
            "invoices",
            "alice_invoice_vector",
            "alice_invoice_vector_index",
        );
        let err = client(&base_url)
            .create_search_index(&definition)
            .await
            .unwrap_err();

        match err {
            RagError::Upstream { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body["errorCode"], "ATLAS_FTS_DUPLICATE_INDEX");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].is_none());
        let digest = seen[1].as_deref().unwrap();
        assert!(digest.starts_with("Digest "));
        assert!(digest.contains(r#"username="public""#));
        assert!(digest.contains(r#"uri="/api/atlas/v1.0/groups/5f1a/clusters/Cluster0/fts/indexes""#));
    }

    #[tokio::test]
    async fn test_unauthorized_without_challenge_is_relayed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let base_url = serve(recording_server(seen.clone(), None)).await;

        let err = client(&base_url)
            .list_search_indexes("invoices", "alice_invoice_vector")
            .await
            .unwrap_err();

        match err {
            RagError::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, json!({ "error": "unauthorized" }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
