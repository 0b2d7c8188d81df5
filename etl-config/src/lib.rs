//! Configuration loading and shared configuration types for the staging mirror.
//!
//! Configuration is hierarchical: a `configuration/base.yaml` file loaded by
//! every service, an environment-specific overlay (`dev.yaml`/`prod.yaml`),
//! and `APP_`-prefixed environment variable overrides with `__` separating
//! nested keys (for example `APP_DESTINATION__PASSWORD`).

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config};
