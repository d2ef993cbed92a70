use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

/// Field holding the vector in stored documents and in the search index
pub const EMBEDDING_FIELD: &str = "embedding";

/// Dimension declared on provisioned search indexes
pub const INDEX_DIMENSIONS: u32 = 1536;

/// Similarity function declared on provisioned search indexes
pub const INDEX_SIMILARITY: &str = "cosine";

/// A source record awaiting (or past) embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Value of the record's `_id`, whatever BSON type it has
    pub id: Bson,
    /// Text extracted from the configured fields
    pub text: String,
    pub processed: bool,
}

/// Provenance of a stored vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Relaxed extended-JSON rendering of the source record id
    pub record_id: String,
    /// Records collection the text came from
    pub collection: String,
}

/// Document written to a vector collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorDocument {
    pub fn new(record_id: &Bson, collection: &str, text: String, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text,
            embedding,
            metadata: VectorMetadata {
                record_id: record_id.clone().into_relaxed_extjson().to_string(),
                collection: collection.to_string(),
            },
        }
    }
}

/// A retrieved document with its similarity score
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoredDocument {
    pub text: String,
    #[serde(default)]
    pub metadata: Option<VectorMetadata>,
    #[serde(default)]
    pub score: f64,
}

/// Supported OpenAI embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum EmbeddingModel {
    /// text-embedding-ada-002 (1536 dimensions)
    #[default]
    #[strum(serialize = "text-embedding-ada-002")]
    TextEmbeddingAda002,
    /// text-embedding-3-small (1536 dimensions)
    #[strum(serialize = "text-embedding-3-small")]
    TextEmbedding3Small,
    /// text-embedding-3-large (3072 dimensions)
    #[strum(serialize = "text-embedding-3-large")]
    TextEmbedding3Large,
}

impl EmbeddingModel {
    pub fn dimension(&self) -> u32 {
        match self {
            EmbeddingModel::TextEmbeddingAda002 => 1536,
            EmbeddingModel::TextEmbedding3Small => 1536,
            EmbeddingModel::TextEmbedding3Large => 3072,
        }
    }

    pub fn model_name(&self) -> &'static str {
        match self {
            EmbeddingModel::TextEmbeddingAda002 => "text-embedding-ada-002",
            EmbeddingModel::TextEmbedding3Small => "text-embedding-3-small",
            EmbeddingModel::TextEmbedding3Large => "text-embedding-3-large",
        }
    }
}

/// Search index to provision over a vector collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexDefinition {
    pub database: String,
    pub collection: String,
    pub name: String,
}

impl SearchIndexDefinition {
    pub fn new(
        database: impl Into<String>,
        collection: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            name: name.into(),
        }
    }

    /// Request body understood by the Atlas full-text-search admin API
    pub fn to_request_body(&self) -> Value {
        json!({
            "collectionName": self.collection,
            "database": self.database,
            "name": self.name,
            "mappings": {
                "dynamic": true,
                "fields": {
                    EMBEDDING_FIELD: {
                        "type": "knnVector",
                        "dimensions": INDEX_DIMENSIONS,
                        "similarity": INDEX_SIMILARITY,
                    }
                }
            }
        })
    }
}

/// Outcome of one batch processing run
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Every record of the snapshot was embedded and flagged
    Completed { records: usize, embedded: usize },
    /// The records collection does not exist
    NoUnprocessedEntries,
    /// A flag update matched nothing; `updated` records were flagged before it
    UpdateFailed { id: String, updated: usize },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Completed { .. })
    }
}

// ===== HTTP DTOs =====

/// Body of `POST /process`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProcessRequest {
    /// Email-like identifier selecting the user's collections
    #[schema(example = "alice@example.com")]
    pub user_id: Option<String>,
}

/// Body of `POST /query`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// Natural-language question
    #[schema(example = "What was the total of my last invoice?")]
    pub query: Option<String>,
    #[schema(example = "alice@example.com")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryResponse {
    /// Synthesized answer
    pub response: String,
}

/// Body of `POST /create_index`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateIndexRequest {
    #[schema(example = "alice@example.com")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = "success")]
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}
