//! Per-user collection and index naming.
//!
//! Nothing here is persisted: the names are recomputed from the user
//! identifier on every request.

use crate::error::{RagError, RagResult};

const RECORDS_SUFFIX: &str = "_invoice";
const VECTOR_SUFFIX: &str = "_vector";
const INDEX_SUFFIX: &str = "_index";

/// Collections and index that scope one user's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Source records carrying the `processed` flag
    pub records_collection: String,
    /// Embeddings written by the batch processor
    pub vector_collection: String,
    /// Search index over `vector_collection`
    pub vector_index: String,
}

impl Namespace {
    pub fn new(
        records_collection: impl Into<String>,
        vector_collection: impl Into<String>,
        vector_index: impl Into<String>,
    ) -> Self {
        Self {
            records_collection: records_collection.into(),
            vector_collection: vector_collection.into(),
            vector_index: vector_index.into(),
        }
    }

    /// Derive the namespace for `user_id`.
    ///
    /// The part before the first `@` becomes the prefix. Index names may not
    /// contain dots, so those become underscores in `vector_index` only.
    ///
    /// ```
    /// use domain_rag::Namespace;
    ///
    /// let ns = Namespace::for_user("a.b@x.com").unwrap();
    /// assert_eq!(ns.records_collection, "a.b_invoice");
    /// assert_eq!(ns.vector_index, "a_b_invoice_vector_index");
    /// ```
    pub fn for_user(user_id: &str) -> RagResult<Self> {
        let prefix = user_id
            .split_once('@')
            .map_or(user_id, |(local, _)| local)
            .trim();

        if prefix.is_empty() {
            return Err(RagError::InvalidRequestBody);
        }

        let records_collection = format!("{prefix}{RECORDS_SUFFIX}");
        let vector_collection = format!("{records_collection}{VECTOR_SUFFIX}");
        let vector_index = format!("{vector_collection}{INDEX_SUFFIX}").replace('.', "_");

        Ok(Self {
            records_collection,
            vector_collection,
            vector_index,
        })
    }
}
