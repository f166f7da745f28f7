//! Loading [`SimConfig`] from RON, TOML or JSON.

use crate::loader::{DataLoadError, deserialize_file, find_data_file};
use millwright_core::config::SimConfig;
use std::path::Path;
use tracing::{debug, info};

/// Base name of the config file looked up by [`load_sim_config_from_dir`].
pub const CONFIG_BASE_NAME: &str = "millwright";

/// Parse and validate one config file. Missing fields take their defaults.
pub fn load_sim_config(path: &Path) -> Result<SimConfig, DataLoadError> {
    let config: SimConfig = deserialize_file(path)?;
    config
        .validate()
        .map_err(|source| DataLoadError::InvalidConfig {
            file: path.to_path_buf(),
            source,
        })?;
    info!(file = %path.display(), workers = config.worker_count, "sim config loaded");
    Ok(config)
}

/// Load `millwright.{ron,toml,json}` from `dir`, or the defaults when none
/// exists.
pub fn load_sim_config_from_dir(dir: &Path) -> Result<SimConfig, DataLoadError> {
    match find_data_file(dir, CONFIG_BASE_NAME)? {
        Some(path) => load_sim_config(&path),
        None => {
            debug!(dir = %dir.display(), "no config file, using defaults");
            Ok(SimConfig::default())
        }
    }
}
