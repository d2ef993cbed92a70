//! RAG Domain
//!
//! Turns per-user MongoDB records into an Atlas vector collection and answers
//! questions over it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Handlers   │  ← HTTP endpoints
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │   Service    │  ← Namespace resolution, query pipeline, index admin
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │  Processor   │  ← Embed unprocessed records, flip their flags
//! └──────┬───────┘
//!        │
//! ┌──────▼────────────────────────────────────────────┐
//! │ Repository / VectorStore / Embedding / Synthesizer │  ← traits + MongoDB,
//! │ SearchIndexAdmin                                    │    OpenAI, Atlas impls
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use core_config::FromEnv;
//! use domain_rag::{RagConfig, RagService, handlers};
//! use mongodb::Client;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_uri_str("mongodb://localhost:27017").await?;
//! let service = RagService::from_config(client.database("invoices"), RagConfig::from_env()?);
//!
//! let router = handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod atlas;
pub mod config;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod models;
pub mod mongodb;
pub mod namespace;
pub mod processor;
pub mod repository;
pub mod service;
pub mod synthesizer;

// Re-export commonly used types
pub use self::atlas::{AtlasAdminClient, SearchIndexAdmin};
pub use self::config::{AtlasAdminConfig, OpenAIConfig, ProcessingConfig, RagConfig};
pub use self::embedding::{EmbeddingProvider, OpenAIProvider};
pub use self::error::{RagError, RagResult};
pub use self::handlers::ApiDoc;
pub use self::models::{
    EmbeddingModel, ProcessOutcome, Record, ScoredDocument, SearchIndexDefinition,
    VectorDocument, VectorMetadata,
};
pub use self::mongodb::{AtlasVectorStore, MongoRecordRepository};
pub use self::namespace::Namespace;
pub use self::processor::BatchProcessor;
pub use self::repository::{RecordRepository, VectorStore};
pub use self::service::RagService;
pub use self::synthesizer::{AnswerSynthesizer, OpenAIChatSynthesizer};
