use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAIConfig;
use crate::error::{RagError, RagResult};
use crate::models::ScoredDocument;

/// Answer returned when retrieval finds nothing
pub const EMPTY_RESPONSE: &str = "Empty Response";

const SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world. \
Always answer the query using the provided context information, and not prior knowledge. \
Never directly reference the given context in your answer.";

/// Turns a question plus retrieved documents into an answer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, query: &str, docs: &[ScoredDocument]) -> RagResult<String>;
}

/// User prompt with the retrieved context followed by the question
pub fn build_prompt(query: &str, docs: &[ScoredDocument]) -> String {
    let context = docs
        .iter()
        .map(|doc| doc.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {query}\n\
         Answer: "
    )
}

/// Single-shot OpenAI chat completion
pub struct OpenAIChatSynthesizer {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIChatSynthesizer {
    pub fn new(config: OpenAIConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: OpenAIConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl AnswerSynthesizer for OpenAIChatSynthesizer {
    #[tracing::instrument(skip(self, query, docs), fields(model = %self.config.chat_model, docs = docs.len()))]
    async fn synthesize(&self, query: &str, docs: &[ScoredDocument]) -> RagResult<String> {
        if docs.is_empty() {
            tracing::debug!("No documents retrieved, skipping completion");
            return Ok(EMPTY_RESPONSE.to_string());
        }

        let prompt = build_prompt(query, docs);
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "OpenAI chat request failed");
            return Err(RagError::upstream(status.as_u16(), &error_text));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RagError::Completion(format!("Malformed completion response: {}", e)))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| RagError::Completion("No completion returned".to_string()))
    }
}
