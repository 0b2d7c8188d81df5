//! Sequential orchestration of one full mirror run.
//!
//! Phases execute strictly in order: structure synchronization and row
//! transfer, entity reconciliation, document aggregation, feedback loading.
//! Connection and catalog errors abort the run; phase-internal failures
//! follow each phase's own policy and are logged while the run continues,
//! except the feedback load which is fatal.

use sqlx::PgPool;
use tracing::{error, info};

use etl_config::shared::MirrorConfig;

use crate::clients::documents::DocumentStoreClient;
use crate::clients::postgres::{DatabaseRole, PgDatabaseClient};
use crate::documents::activities::{ActivityDocument, sync_activities};
use crate::documents::classes::{ClassDocument, sync_classes};
use crate::documents::lookup::{DisabledLawLookup, HttpLawLookup, LawLookup};
use crate::error::EtlResult;
use crate::feedback::load_feedback;
use crate::reconcile::{connect_pool, plans, segments, workers};
use crate::schema::{ddl, diff};
use crate::transfer::transfer_all;

/// Collection receiving the aggregated activity documents.
const ACTIVITIES_COLLECTION: &str = "activities";

/// Collection receiving the aggregated class documents.
const CLASSES_COLLECTION: &str = "classes";

/// One full mirror run over the configured source and destination stores.
pub struct MirrorPipeline {
    config: MirrorConfig,
}

impl MirrorPipeline {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    /// Executes the run.
    pub async fn run(&self) -> EtlResult<()> {
        let source = PgDatabaseClient::connect(&self.config.source, DatabaseRole::Source).await?;
        let destination =
            PgDatabaseClient::connect(&self.config.destination, DatabaseRole::Destination).await?;

        self.sync_structure(&source, &destination).await?;

        let pool = connect_pool(&self.config.destination).await?;
        self.reconcile_entities(&pool).await;
        self.aggregate_documents(&pool).await?;

        match &self.config.scores_api {
            Some(scores_api) => {
                load_feedback(&pool, scores_api).await?;
            }
            None => {
                info!("scores api not configured, skipping the feedback phase");
            }
        }

        info!("mirror run finished");

        Ok(())
    }

    /// Structure phase: catalog inspection, DDL synthesis, column diff and
    /// row transfer.
    async fn sync_structure(
        &self,
        source: &PgDatabaseClient,
        destination: &PgDatabaseClient,
    ) -> EtlResult<()> {
        let source_schema = &self.config.source_schema;
        let staging_schema = &self.config.staging_schema;

        ddl::create_staging_schema(destination, staging_schema).await?;

        let structures = source.get_table_structures(source_schema).await?;
        let foreign_keys = source.get_foreign_keys(source_schema).await?;
        info!(
            tables = structures.len(),
            foreign_keys = foreign_keys.len(),
            "source catalog inspected"
        );

        ddl::create_tables(destination, staging_schema, &structures).await;
        ddl::create_foreign_keys(destination, staging_schema, &foreign_keys).await;

        let report =
            diff::sync_table_structures(source, destination, source_schema, staging_schema).await?;
        info!(
            added = report.added_columns,
            dropped = report.dropped_columns,
            "staging structure synchronized"
        );

        let report = transfer_all(source, destination, source_schema, staging_schema).await?;
        info!(
            copied = report.copied_tables,
            rows = report.inserted_rows,
            skipped = report.skipped_empty + report.skipped_in_sync,
            failed = report.failed_tables,
            "row transfer finished"
        );

        Ok(())
    }

    /// Entity phase: a failed reconciler is logged while the others still
    /// run.
    async fn reconcile_entities(&self, pool: &PgPool) {
        let staging_schema = &self.config.staging_schema;

        if let Err(err) = plans::reconcile_plans(pool, staging_schema).await {
            error!("failed to reconcile plans: {}", err);
        }

        if let Err(err) = segments::reconcile_segments(pool, staging_schema).await {
            error!("failed to reconcile segments: {}", err);
        }

        if let Err(err) = workers::reconcile_workers(pool, staging_schema).await {
            error!("failed to reconcile workers: {}", err);
        }
    }

    /// Document phase: activities then classes, with the same
    /// continue-on-failure policy as the entity phase.
    async fn aggregate_documents(&self, pool: &PgPool) -> EtlResult<()> {
        let documents = DocumentStoreClient::connect(&self.config.documents).await?;
        let staging_schema = &self.config.staging_schema;

        let activities = documents.collection::<ActivityDocument>(ACTIVITIES_COLLECTION);
        if let Err(err) = sync_activities(pool, &activities, staging_schema).await {
            error!("failed to sync the activities collection: {}", err);
        }

        let lookup: Box<dyn LawLookup> = match &self.config.law_lookup {
            Some(law_lookup) => Box::new(HttpLawLookup::new(law_lookup)),
            None => Box::new(DisabledLawLookup),
        };

        let classes = documents.collection::<ClassDocument>(CLASSES_COLLECTION);
        if let Err(err) = sync_classes(
            pool,
            &classes,
            staging_schema,
            self.config.content_max_len,
            lookup.as_ref(),
        )
        .await
        {
            error!("failed to sync the classes collection: {}", err);
        }

        Ok(())
    }
}
