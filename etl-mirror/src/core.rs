use etl::pipeline::MirrorPipeline;
use etl_config::shared::MirrorConfig;
use tracing::info;

use crate::error::MirrorResult;

/// Starts one mirror run with the provided configuration.
///
/// Builds the pipeline and executes its phases in order. Failure policy lives
/// inside the pipeline; anything surfacing here already aborted the run.
pub async fn run_mirror_with_config(config: MirrorConfig) -> MirrorResult<()> {
    info!(
        source_schema = %config.source_schema,
        staging_schema = %config.staging_schema,
        "starting mirror run"
    );

    let pipeline = MirrorPipeline::new(config);
    pipeline.run().await?;

    Ok(())
}
