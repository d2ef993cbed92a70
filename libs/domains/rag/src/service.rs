//! RAG Service - orchestration of processing, querying and index admin

use std::sync::Arc;

use mongodb::Database;
use serde_json::Value;
use tracing::instrument;

use crate::atlas::{AtlasAdminClient, SearchIndexAdmin};
use crate::config::RagConfig;
use crate::embedding::{EmbeddingProvider, OpenAIProvider};
use crate::error::{RagError, RagResult};
use crate::models::{ProcessOutcome, SearchIndexDefinition};
use crate::mongodb::{AtlasVectorStore, MongoRecordRepository};
use crate::namespace::Namespace;
use crate::processor::BatchProcessor;
use crate::repository::{RecordRepository, VectorStore};
use crate::synthesizer::{AnswerSynthesizer, OpenAIChatSynthesizer};

/// Entry point for every RAG operation exposed over HTTP
#[derive(Clone)]
pub struct RagService {
    processor: BatchProcessor,
    embeddings: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    admin: Option<Arc<dyn SearchIndexAdmin>>,
    /// Database holding the vector collections, as named to the admin API
    database: String,
    default_namespace: Option<Namespace>,
    top_k: usize,
}

impl RagService {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        embeddings: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            processor: BatchProcessor::new(records, embeddings.clone(), vectors.clone()),
            embeddings,
            vectors,
            synthesizer,
            admin: None,
            database: database.into(),
            default_namespace: None,
            top_k: 20,
        }
    }

    /// Wire MongoDB, OpenAI and (when configured) the Atlas admin API
    pub fn from_config(db: Database, config: RagConfig) -> Self {
        let http = reqwest::Client::new();
        let database = db.name().to_string();

        let records = Arc::new(MongoRecordRepository::new(
            db.clone(),
            config.processing.text_fields.clone(),
        ));
        let embeddings = Arc::new(OpenAIProvider::with_client(
            http.clone(),
            config.openai.clone(),
        ));
        let vectors = Arc::new(AtlasVectorStore::new(db));
        let synthesizer = Arc::new(OpenAIChatSynthesizer::with_client(
            http.clone(),
            config.openai,
        ));

        let mut service = Self::new(records, embeddings, vectors, synthesizer, database)
            .with_top_k(config.processing.similarity_top_k)
            .with_batch_size(config.processing.embed_batch_size);

        if let Some(atlas) = config.atlas {
            service = service.with_admin(Arc::new(AtlasAdminClient::with_client(http, atlas)));
        }
        if let Some(namespace) = config.default_namespace {
            service = service.with_default_namespace(namespace);
        }
        service
    }

    pub fn with_admin(mut self, admin: Arc<dyn SearchIndexAdmin>) -> Self {
        self.admin = Some(admin);
        self
    }

    pub fn with_default_namespace(mut self, namespace: Namespace) -> Self {
        self.default_namespace = Some(namespace);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.processor = self.processor.with_batch_size(batch_size);
        self
    }

    /// Namespace for `user_id`, or the configured default when absent
    pub fn resolve_namespace(&self, user_id: Option<&str>) -> RagResult<Namespace> {
        match user_id {
            Some(user_id) => Namespace::for_user(user_id),
            None => self
                .default_namespace
                .clone()
                .ok_or(RagError::InvalidRequestBody),
        }
    }

    /// Run one batch over the user's unprocessed records
    #[instrument(skip(self))]
    pub async fn process(&self, user_id: Option<&str>) -> RagResult<ProcessOutcome> {
        let namespace = self.resolve_namespace(user_id)?;
        self.processor.process(&namespace).await
    }

    /// Answer `query` from the user's embedded documents
    #[instrument(skip(self, query))]
    pub async fn query(&self, user_id: Option<&str>, query: &str) -> RagResult<String> {
        let namespace = self.resolve_namespace(user_id)?;

        let embedding = self.embeddings.embed(query).await?;
        let docs = self
            .vectors
            .search(&namespace, embedding, self.top_k)
            .await?;
        tracing::debug!(hits = docs.len(), "Retrieved context");

        self.synthesizer.synthesize(query, &docs).await
    }

    fn admin(&self) -> RagResult<&Arc<dyn SearchIndexAdmin>> {
        self.admin
            .as_ref()
            .ok_or_else(|| RagError::Config("Atlas admin API is not configured".to_string()))
    }

    /// Provision the vector search index for the user's vector collection
    #[instrument(skip(self))]
    pub async fn create_index(&self, user_id: Option<&str>) -> RagResult<Value> {
        let admin = self.admin()?;
        let namespace = self.resolve_namespace(user_id)?;
        let definition = SearchIndexDefinition::new(
            &self.database,
            namespace.vector_collection,
            namespace.vector_index,
        );

        admin.create_search_index(&definition).await
    }

    #[instrument(skip(self))]
    pub async fn list_indexes(&self, database: &str, collection: &str) -> RagResult<Value> {
        self.admin()?.list_search_indexes(database, collection).await
    }
}
