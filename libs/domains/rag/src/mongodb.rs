//! MongoDB implementations of the record and vector stores

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Database,
    bson::{Bson, Document, doc, from_document},
};
use tracing::instrument;

use crate::error::{RagError, RagResult};
use crate::models::{EMBEDDING_FIELD, Record, ScoredDocument, VectorDocument};
use crate::namespace::Namespace;
use crate::repository::{RecordRepository, VectorStore};

/// Records stored as free-form documents with a `processed` flag
pub struct MongoRecordRepository {
    db: Database,
    text_fields: Vec<String>,
}

impl MongoRecordRepository {
    /// # Example
    /// ```ignore
    /// let db = client.database("invoices");
    /// let repo = MongoRecordRepository::new(db, vec!["text".to_string()]);
    /// ```
    pub fn new(db: Database, text_fields: Vec<String>) -> Self {
        Self { db, text_fields }
    }
}

/// Join the configured fields of `doc` into one text, one field per line
fn extract_text(doc: &Document, fields: &[String]) -> String {
    fields
        .iter()
        .filter_map(|field| match doc.get(field)? {
            Bson::String(s) => Some(s.clone()),
            Bson::Null => None,
            other => Some(other.clone().into_relaxed_extjson().to_string()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn record_from_document(doc: Document, fields: &[String]) -> RagResult<Record> {
    let text = extract_text(&doc, fields);
    let processed = doc.get_bool("processed").unwrap_or(false);
    let id = doc
        .get("_id")
        .cloned()
        .ok_or_else(|| RagError::Database("record without _id".to_string()))?;

    Ok(Record {
        id,
        text,
        processed,
    })
}

#[async_trait]
impl RecordRepository for MongoRecordRepository {
    #[instrument(skip(self))]
    async fn find_unprocessed(&self, collection: &str) -> RagResult<Option<Vec<Record>>> {
        let existing = self
            .db
            .list_collection_names()
            .filter(doc! { "name": collection })
            .await?;
        if existing.is_empty() {
            tracing::debug!("Records collection does not exist");
            return Ok(None);
        }

        let cursor = self
            .db
            .collection::<Document>(collection)
            .find(doc! { "processed": false })
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;

        let records = docs
            .into_iter()
            .map(|doc| record_from_document(doc, &self.text_fields))
            .collect::<RagResult<Vec<_>>>()?;

        tracing::debug!(count = records.len(), "Loaded unprocessed records");
        Ok(Some(records))
    }

    #[instrument(skip(self, id), fields(id = %id))]
    async fn mark_processed(&self, collection: &str, id: &Bson) -> RagResult<u64> {
        let result = self
            .db
            .collection::<Document>(collection)
            .update_one(
                doc! { "_id": id.clone() },
                doc! { "$set": { "processed": true } },
            )
            .await?;

        Ok(result.modified_count)
    }
}

/// Vector collections searched through Atlas `$vectorSearch`
pub struct AtlasVectorStore {
    db: Database,
}

impl AtlasVectorStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Aggregation pipeline for a `$vectorSearch` query
pub fn build_search_pipeline(index: &str, embedding: &[f32], top_k: usize) -> Vec<Document> {
    let query_vector: Vec<f64> = embedding.iter().map(|v| f64::from(*v)).collect();
    let limit = i64::try_from(top_k).unwrap_or(i64::MAX);

    vec![
        doc! {
            "$vectorSearch": {
                "index": index,
                "path": EMBEDDING_FIELD,
                "queryVector": query_vector,
                "numCandidates": limit.saturating_mul(10),
                "limit": limit,
            }
        },
        doc! {
            "$project": {
                "_id": 0,
                "text": 1,
                "metadata": 1,
                "score": { "$meta": "vectorSearchScore" },
            }
        },
    ]
}

#[async_trait]
impl VectorStore for AtlasVectorStore {
    #[instrument(skip(self, docs), fields(collection = %namespace.vector_collection, count = docs.len()))]
    async fn add(&self, namespace: &Namespace, docs: Vec<VectorDocument>) -> RagResult<usize> {
        if docs.is_empty() {
            return Ok(0);
        }

        let result = self
            .db
            .collection::<VectorDocument>(&namespace.vector_collection)
            .insert_many(&docs)
            .await?;

        Ok(result.inserted_ids.len())
    }

    #[instrument(skip(self, embedding), fields(index = %namespace.vector_index))]
    async fn search(
        &self,
        namespace: &Namespace,
        embedding: Vec<f32>,
        top_k: usize,
    ) -> RagResult<Vec<ScoredDocument>> {
        let pipeline = build_search_pipeline(&namespace.vector_index, &embedding, top_k);

        let cursor = self
            .db
            .collection::<Document>(&namespace.vector_collection)
            .aggregate(pipeline)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;

        let results = docs
            .into_iter()
            .map(from_document::<ScoredDocument>)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(hits = results.len(), "Vector search finished");
        Ok(results)
    }
}
