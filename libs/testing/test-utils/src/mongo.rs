//! MongoDB test infrastructure
//!
//! Provides a `TestMongo` helper that runs a throwaway MongoDB container.

use mongodb::{Client, Database};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::mongo::Mongo;

/// Test MongoDB wrapper that ensures proper cleanup
///
/// The container is stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestMongo;
/// use mongodb::bson::doc;
///
/// # async fn example() {
/// let mongo = TestMongo::new().await;
/// let db = mongo.database("invoices");
///
/// db.collection("alice_invoice")
///     .insert_one(doc! { "text": "hello", "processed": false })
///     .await
///     .unwrap();
/// # }
/// ```
pub struct TestMongo {
    #[allow(dead_code)]
    container: ContainerAsync<Mongo>,
    client: Client,
    pub url: String,
}

impl TestMongo {
    /// Start a MongoDB 7 container and connect to it
    pub async fn new() -> Self {
        let container = Mongo::default()
            .with_tag("7")
            .start()
            .await
            .expect("Failed to start MongoDB container");

        let host_port = container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");

        let url = format!("mongodb://127.0.0.1:{}", host_port);

        let client = Client::with_uri_str(&url)
            .await
            .expect("Failed to create MongoDB client");

        tracing::info!(port = host_port, "Test MongoDB ready (mongo:7)");

        Self {
            container,
            client,
            url,
        }
    }

    /// Client connected to the container
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Handle to a database inside the container
    pub fn database(&self, name: &str) -> Database {
        self.client.database(name)
    }
}
