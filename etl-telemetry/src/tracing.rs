use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Default filter directive applied when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVE: &str = "info";

/// Initializes the global tracing subscriber for a binary.
///
/// Log lines go to stdout with the service name attached as a field. The
/// filter honors `RUST_LOG` and falls back to `info` so per-phase progress
/// counts are always visible.
pub fn init_tracing(service_name: &str) -> Result<(), SetGlobalDefaultError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(service = service_name, "tracing initialized");

    Ok(())
}
