use core_config::{ConfigError, FromEnv, env_optional, env_or_default, env_parse, env_required};
use std::str::FromStr;

use crate::models::{EmbeddingModel, INDEX_DIMENSIONS};
use crate::namespace::Namespace;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_ATLAS_BASE_URL: &str = "https://cloud.mongodb.com/api/atlas/v1.0";
/// Atlas caps `numCandidates` at 10000 and the search asks for ten per hit
pub const MAX_SIMILARITY_TOP_K: usize = 1000;

/// OpenAI credentials and model selection shared by embedding and chat
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: EmbeddingModel,
    pub chat_model: String,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            embedding_model: EmbeddingModel::default(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl FromEnv for OpenAIConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_required("OPENAI_API_KEY")?;

        let embedding_model = match env_optional("OPENAI_EMBEDDING_MODEL") {
            Some(raw) => EmbeddingModel::from_str(&raw).map_err(|_| ConfigError::ParseError {
                key: "OPENAI_EMBEDDING_MODEL".to_string(),
                details: format!("unsupported embedding model '{raw}'"),
            })?,
            None => EmbeddingModel::default(),
        };
        if embedding_model.dimension() != INDEX_DIMENSIONS {
            return Err(ConfigError::Invalid(format!(
                "OPENAI_EMBEDDING_MODEL '{}' produces {} dimensions, the vector index holds {}",
                embedding_model,
                embedding_model.dimension(),
                INDEX_DIMENSIONS
            )));
        }

        Ok(Self {
            api_key,
            base_url: env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            embedding_model,
            chat_model: env_or_default("OPENAI_CHAT_MODEL", DEFAULT_CHAT_MODEL),
        })
    }
}

/// Atlas administrative API access (digest-authenticated)
#[derive(Debug, Clone)]
pub struct AtlasAdminConfig {
    pub base_url: String,
    pub project_id: String,
    pub cluster_name: String,
    pub public_key: String,
    pub private_key: String,
}

impl AtlasAdminConfig {
    const KEYS: [&'static str; 4] = [
        "ATLAS_PROJECT_ID",
        "ATLAS_CLUSTER_NAME",
        "ATLAS_PUBLIC_KEY",
        "ATLAS_PRIVATE_KEY",
    ];

    /// Load the admin settings, or `None` when none of them are set.
    ///
    /// Setting only some of the four values is a configuration error.
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        let values: Vec<Option<String>> = Self::KEYS.iter().map(|key| env_optional(key)).collect();

        if values.iter().all(Option::is_none) {
            return Ok(None);
        }

        let missing: Vec<&str> = Self::KEYS
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Atlas admin settings are incomplete, missing {}",
                missing.join(", ")
            )));
        }

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();
        Ok(Some(Self {
            base_url: env_or_default("ATLAS_API_BASE_URL", DEFAULT_ATLAS_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            project_id: next(),
            cluster_name: next(),
            public_key: next(),
            private_key: next(),
        }))
    }
}

/// Tuning for retrieval and batch processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingConfig {
    pub similarity_top_k: usize,
    pub embed_batch_size: usize,
    /// Record fields concatenated into the embedded text
    pub text_fields: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: 20,
            embed_batch_size: 16,
            text_fields: vec!["text".to_string()],
        }
    }
}

impl FromEnv for ProcessingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let similarity_top_k = env_parse("RAG_SIMILARITY_TOP_K", defaults.similarity_top_k)?;
        let embed_batch_size = env_parse("RAG_EMBED_BATCH_SIZE", defaults.embed_batch_size)?;
        if similarity_top_k == 0 || embed_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "RAG_SIMILARITY_TOP_K and RAG_EMBED_BATCH_SIZE must be positive".to_string(),
            ));
        }
        if similarity_top_k > MAX_SIMILARITY_TOP_K {
            return Err(ConfigError::Invalid(format!(
                "RAG_SIMILARITY_TOP_K must be at most {MAX_SIMILARITY_TOP_K}"
            )));
        }

        let text_fields = env_optional("RAG_TEXT_FIELDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|fields| !fields.is_empty())
            .unwrap_or(defaults.text_fields);

        Ok(Self {
            similarity_top_k,
            embed_batch_size,
            text_fields,
        })
    }
}

/// Namespace used when a request carries no `user_id`.
///
/// Only present when `MONGODB_COLLECTION` is set; the vector collection and
/// index names fall back to the usual suffixes.
pub fn default_namespace_from_env() -> Option<Namespace> {
    let records = env_optional("MONGODB_COLLECTION")?;
    let vectors = env_optional("MONGODB_VECTORS").unwrap_or_else(|| format!("{records}_vector"));
    let index = env_optional("MONGODB_VECTOR_INDEX")
        .unwrap_or_else(|| format!("{vectors}_index").replace('.', "_"));
    Some(Namespace::new(records, vectors, index))
}

/// Everything the RAG domain reads from the environment
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub openai: OpenAIConfig,
    pub atlas: Option<AtlasAdminConfig>,
    pub processing: ProcessingConfig,
    pub default_namespace: Option<Namespace>,
}

impl FromEnv for RagConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            openai: OpenAIConfig::from_env()?,
            atlas: AtlasAdminConfig::from_env_optional()?,
            processing: ProcessingConfig::from_env()?,
            default_namespace: default_namespace_from_env(),
        })
    }
}
