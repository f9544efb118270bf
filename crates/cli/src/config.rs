//! Configuration resolution shared by the commands.

use std::path::Path;

use config_loader::{BusConfig, ConfigLoader};
use tracing::info;

use crate::error::{CliError, Result};

/// Load `path` if given, otherwise fall back to defaults
pub fn load_or_default(path: Option<&Path>) -> Result<BusConfig> {
    match path {
        Some(path) => load(path),
        None => {
            info!("No configuration file given, using defaults");
            Ok(BusConfig::default())
        }
    }
}

/// Load and validate a configuration file
pub fn load(path: &Path) -> Result<BusConfig> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    info!(config = %path.display(), "Loading configuration");
    Ok(ConfigLoader::load_from_path(path)?)
}
