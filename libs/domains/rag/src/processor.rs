use std::sync::Arc;

use mongodb::bson::Bson;
use tracing::instrument;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, RagResult};
use crate::models::{ProcessOutcome, Record, VectorDocument};
use crate::namespace::Namespace;
use crate::repository::{RecordRepository, VectorStore};

/// Embeds unprocessed records and flips their `processed` flags.
///
/// One snapshot of unprocessed records drives both steps. Embedding failures
/// abort before any flag is touched; a failed flag update stops the run but
/// keeps earlier updates, so a rerun may embed a record twice.
///
/// Records whose text is blank are flagged without a vector: there is nothing
/// to embed, and leaving them unflagged would return them on every run. So a
/// processed record has a vector unless its text was blank or a partial
/// failure left it behind.
#[derive(Clone)]
pub struct BatchProcessor {
    records: Arc<dyn RecordRepository>,
    embeddings: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    batch_size: usize,
}

fn display_id(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

impl BatchProcessor {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        embeddings: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            records,
            embeddings,
            vectors,
            batch_size: 16,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[instrument(skip(self), fields(collection = %namespace.records_collection))]
    pub async fn process(&self, namespace: &Namespace) -> RagResult<ProcessOutcome> {
        let Some(records) = self
            .records
            .find_unprocessed(&namespace.records_collection)
            .await?
        else {
            tracing::warn!("no unprocessed entries");
            return Ok(ProcessOutcome::NoUnprocessedEntries);
        };

        let embedded = self.embed_records(namespace, &records).await?;

        for (updated, record) in records.iter().enumerate() {
            let modified = self
                .records
                .mark_processed(&namespace.records_collection, &record.id)
                .await?;

            let id = display_id(&record.id);
            if modified == 0 {
                tracing::warn!(id = %id, updated, "Failed to mark record as processed");
                return Ok(ProcessOutcome::UpdateFailed { id, updated });
            }
            tracing::info!(id = %id, "Record marked as processed");
        }

        tracing::info!(records = records.len(), embedded, "Batch processed");
        Ok(ProcessOutcome::Completed {
            records: records.len(),
            embedded,
        })
    }

    /// Embed and store every record with non-blank text, chunk by chunk
    async fn embed_records(&self, namespace: &Namespace, records: &[Record]) -> RagResult<usize> {
        let embeddable: Vec<&Record> = records
            .iter()
            .filter(|record| !record.text.trim().is_empty())
            .collect();

        let mut embedded = 0;
        for chunk in embeddable.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|record| record.text.clone()).collect();
            let vectors = self.embeddings.embed_batch(&texts).await?;
            if vectors.len() != chunk.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    vectors.len()
                )));
            }

            let docs = chunk
                .iter()
                .zip(vectors)
                .map(|(record, embedding)| {
                    VectorDocument::new(
                        &record.id,
                        &namespace.records_collection,
                        record.text.clone(),
                        embedding,
                    )
                })
                .collect();

            embedded += self.vectors.add(namespace, docs).await?;
        }

        Ok(embedded)
    }
}
