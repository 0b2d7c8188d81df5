//! Document store client for the aggregated activity and class documents.
//!
//! Thin wrapper over a MongoDB database handle. Collections are typed: the
//! aggregators define serde document shapes and the reconciliation logic
//! compares fetched documents against rebuilt ones with plain `PartialEq`.

use etl_config::shared::DocumentStoreConfig;
use mongodb::{Client, Collection, Database};
use secrecy::ExposeSecret;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// A client for the document store receiving aggregated documents.
#[derive(Debug, Clone)]
pub struct DocumentStoreClient {
    database: Database,
}

impl DocumentStoreClient {
    /// Connects to the document store described by the configuration.
    ///
    /// The underlying driver connects lazily; an unreachable server surfaces
    /// on the first operation, not here.
    pub async fn connect(config: &DocumentStoreConfig) -> EtlResult<Self> {
        let client = Client::with_uri_str(config.uri.expose_secret())
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::DestinationConnectionFailed,
                    "Failed to connect to the document store",
                    source: err
                )
            })?;

        info!(database = %config.database, "connected to the document store");

        Ok(Self {
            database: client.database(&config.database),
        })
    }

    /// Returns a typed handle to a collection.
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database.collection(name)
    }
}
