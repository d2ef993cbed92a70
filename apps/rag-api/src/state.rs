//! Shared application state passed to route builders.

use mongodb::{Client, Database};

/// Cloned into each router (the MongoDB handles share one connection pool)
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    pub mongo_client: Client,
    /// Database holding both the records and the vector collections
    pub db: Database,
}
