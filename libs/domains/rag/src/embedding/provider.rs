use async_trait::async_trait;

use crate::error::RagResult;
use crate::models::EmbeddingModel;

/// Trait for embedding generation providers
///
/// Every vector written or queried goes through the same provider, so stored
/// documents and queries share one vector space.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model used for every call
    fn model(&self) -> EmbeddingModel;

    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> RagResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_batch(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>>;
}
