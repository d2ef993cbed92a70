use async_trait::async_trait;
use mongodb::bson::Bson;

use crate::error::RagResult;
use crate::models::{Record, ScoredDocument, VectorDocument};
use crate::namespace::Namespace;

/// Access to the source records and their `processed` flags
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Snapshot of records with `processed == false`.
    ///
    /// `None` means the collection does not exist at all.
    async fn find_unprocessed(&self, collection: &str) -> RagResult<Option<Vec<Record>>>;

    /// Set `processed = true` on one record, returning the modified count
    async fn mark_processed(&self, collection: &str, id: &Bson) -> RagResult<u64>;
}

/// Storage and similarity search over embedded documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert documents into the namespace's vector collection
    async fn add(&self, namespace: &Namespace, docs: Vec<VectorDocument>) -> RagResult<usize>;

    /// Nearest documents to `embedding`, best first
    async fn search(
        &self,
        namespace: &Namespace,
        embedding: Vec<f32>,
        top_k: usize,
    ) -> RagResult<Vec<ScoredDocument>>;
}
