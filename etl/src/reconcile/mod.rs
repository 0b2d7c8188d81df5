//! Entity reconciliation between the staging schema and operational tables.
//!
//! Each reconciler takes a full snapshot of a source-derived entity list and
//! converges the destination table with it: rows missing from the source are
//! removed (or deactivated, for workers), existing rows have their mutable
//! fields updated in place, and new rows are inserted. Statements run one at
//! a time on an autocommit pool, so one bad row never rolls back the rows
//! already applied in the same pass.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use etl_config::shared::{IntoConnectOptions, PgConnectionConfig};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

pub mod plans;
pub mod segments;
pub mod workers;

/// Per-pass counts logged by every reconciler.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub inserted: u64,
    pub updated: u64,
    /// Deleted rows, or deactivated rows for the workers reconciler.
    pub removed: u64,
}

/// Opens the autocommit pool used by the reconcilers and the feedback loader.
pub async fn connect_pool(config: &PgConnectionConfig) -> EtlResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect_with(config.with_db())
        .await
        .map_err(|err| {
            etl_error!(
                ErrorKind::DestinationConnectionFailed,
                "Failed to connect to the destination pool",
                source: err
            )
        })
}
