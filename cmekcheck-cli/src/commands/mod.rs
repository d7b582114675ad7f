//! Command handlers -- one module per subcommand

pub mod config;
pub mod run;

use std::path::{Path, PathBuf};

use tracing::debug;

use cmekcheck_core::config::CmekCheckConfig;

use crate::cli::DEFAULT_CONFIG_FILE;
use crate::error::CliError;

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => write!(f, "(defaults + environment)"),
        }
    }
}

/// Resolve the configuration file path.
///
/// An explicit path must exist. Without one, `cmekcheck.toml` in the working
/// directory is used when present.
pub fn resolve_config_source(explicit: Option<&Path>) -> ConfigSource {
    match explicit {
        Some(path) => ConfigSource::File(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.exists() {
                ConfigSource::File(default)
            } else {
                ConfigSource::Defaults
            }
        }
    }
}

/// Load the effective configuration (file or defaults, then env overrides).
pub async fn load_config(source: &ConfigSource) -> Result<CmekCheckConfig, CliError> {
    let config = match source {
        ConfigSource::File(path) => CmekCheckConfig::load(path).await?,
        ConfigSource::Defaults => CmekCheckConfig::from_env()?,
    };
    debug!(source = %source, "configuration loaded");
    Ok(config)
}
