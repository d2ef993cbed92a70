use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::OpenAIConfig;
use crate::error::{RagError, RagResult};
use crate::models::EmbeddingModel;

/// OpenAI `/embeddings` client
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Share an existing HTTP client (connection pool) with other callers
    pub fn with_client(client: Client, config: OpenAIConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.base_url)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Order embeddings by their response index and check none are missing
fn into_ordered(mut data: Vec<EmbeddingData>, expected: usize) -> RagResult<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(RagError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model(&self) -> EmbeddingModel {
        self.config.embedding_model
    }

    async fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    #[tracing::instrument(skip(self, texts), fields(count = texts.len(), model = %self.config.embedding_model))]
    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: self.config.embedding_model.model_name(),
            input: texts,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "OpenAI embedding request failed");
            return Err(RagError::upstream(status.as_u16(), &error_text));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Malformed embedding response: {}", e)))?;

        into_ordered(body.data, texts.len())
    }
}
