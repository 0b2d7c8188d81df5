//! Staging mirror service binary.
//!
//! Loads configuration, initializes tracing, starts the async runtime and
//! executes one full mirror run: structure synchronization, row transfer,
//! entity reconciliation, document aggregation and feedback loading.

use etl_config::shared::MirrorConfig;
use etl_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_mirror_config;
use crate::core::run_mirror_with_config;
use crate::error::{MirrorError, MirrorResult};

mod config;
mod core;
mod error;

/// Entry point for the mirror service.
///
/// Loads configuration, initializes tracing, starts the async runtime, and
/// launches the mirror pipeline.
fn main() -> MirrorResult<()> {
    let mirror_config = load_mirror_config()?;

    init_tracing(env!("CARGO_BIN_NAME")).map_err(MirrorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(mirror_config))?;

    Ok(())
}

/// Main async entry point that runs the mirror pipeline and reports failures.
async fn async_main(mirror_config: MirrorConfig) -> MirrorResult<()> {
    if let Err(err) = run_mirror_with_config(mirror_config).await {
        error!("{err}");
        eprintln!("{}", err.render_report());

        return Err(err);
    }

    Ok(())
}
