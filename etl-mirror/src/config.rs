use etl_config::load_config;
use etl_config::shared::MirrorConfig;

use crate::error::{MirrorError, MirrorResult};

/// Loads and validates the mirror configuration.
///
/// Uses the standard configuration loading mechanism from [`etl_config`] and
/// validates the resulting [`MirrorConfig`] before returning it.
pub fn load_mirror_config() -> MirrorResult<MirrorConfig> {
    let config = load_config::<MirrorConfig>().map_err(MirrorError::config)?;
    config.validate().map_err(MirrorError::config)?;

    Ok(config)
}
