//! Bootstrap configuration loading and output folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Folder used when no output folder is configured anywhere
pub const DEFAULT_OUTPUT_DIR: &str = "./filmroom_out";

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Read and parse a TOML file into `T`.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

/// Platform config file location for a module, e.g.
/// `~/.config/filmroom/filmroom-ai.toml` on Linux.
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("filmroom").join(format!("{}.toml", module_name)))
}

/// Output folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config value
/// 4. [`DEFAULT_OUTPUT_DIR`]
pub fn resolve_output_dir(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    PathBuf::from(DEFAULT_OUTPUT_DIR)
}
