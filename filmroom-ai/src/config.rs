//! Configuration resolution for filmroom-ai
//!
//! Bootstrap settings come from a TOML file whose fields are all optional.
//! The API key and output folder can also come from the environment, which
//! wins over TOML.

use crate::aggregator::DEFAULT_OVERRIDE_THRESHOLD;
use crate::retry::RetryPolicy;
use crate::stages::deep_analysis::DEFAULT_INTER_REQUEST_DELAY;
use crate::types::MIN_SEGMENT_SECS;
use filmroom_common::config::{default_config_path, load_toml, LoggingConfig};
use filmroom_common::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Module name used for the default config file
pub const MODULE_NAME: &str = "filmroom-ai";

/// Environment variables checked for the provider API key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["FILMROOM_API_KEY", "GEMINI_API_KEY"];

/// Environment variable overriding the output folder
pub const OUTPUT_DIR_ENV_VAR: &str = "FILMROOM_OUTPUT_DIR";

/// Whole TOML document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub output_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
}

/// `[provider]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub requests_per_minute: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            requests_per_minute: 10,
            request_timeout_secs: 600,
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inter_request_delay_ms: u64,
    pub override_threshold: f64,
    pub min_segment_secs: u64,
    pub resume: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: DEFAULT_INTER_REQUEST_DELAY.as_millis() as u64,
            override_threshold: DEFAULT_OVERRIDE_THRESHOLD,
            min_segment_secs: MIN_SEGMENT_SECS,
            resume: false,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            jitter_ms: policy.jitter.as_millis() as u64,
            max_retries: policy.max_retries,
        }
    }
}

/// Validated settings handed to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    pub inter_request_delay: Duration,
    /// Always within [0, 1]
    pub override_threshold: f64,
    /// Always at least 1
    pub min_segment_secs: u64,
    pub resume: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

impl PipelineSettings {
    /// Validate the TOML sections into runtime settings
    pub fn from_config(config: &TomlConfig) -> Self {
        let pipeline = &config.pipeline;

        let override_threshold = if pipeline.override_threshold.is_finite() {
            pipeline.override_threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_OVERRIDE_THRESHOLD
        };
        if override_threshold != pipeline.override_threshold {
            warn!(
                configured = pipeline.override_threshold,
                using = override_threshold,
                "override_threshold out of range"
            );
        }

        let min_segment_secs = if pipeline.min_segment_secs == 0 {
            warn!("min_segment_secs = 0 is invalid, using {}", MIN_SEGMENT_SECS);
            MIN_SEGMENT_SECS
        } else {
            pipeline.min_segment_secs
        };

        Self {
            retry: RetryPolicy {
                base_delay: Duration::from_millis(config.retry.base_delay_ms),
                jitter: Duration::from_millis(config.retry.jitter_ms),
                max_retries: config.retry.max_retries,
            },
            inter_request_delay: Duration::from_millis(pipeline.inter_request_delay_ms),
            override_threshold,
            min_segment_secs,
            resume: pipeline.resume,
        }
    }
}

/// Load the bootstrap config.
///
/// An explicit path must exist and parse. Without one, the platform default
/// is used if present; otherwise built-in defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        info!("Loading config from {}", path.display());
        return load_toml(path);
    }

    match default_config_path(MODULE_NAME) {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml(&path)
        }
        _ => {
            info!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Resolve the provider API key
///
/// **Priority:** ENV (`FILMROOM_API_KEY`, `GEMINI_API_KEY`) → TOML
pub fn resolve_api_key(config: &TomlConfig) -> Result<String> {
    let mut found: Vec<(&str, String)> = API_KEY_ENV_VARS
        .iter()
        .filter_map(|var| {
            std::env::var(var)
                .ok()
                .filter(|k| is_valid_key(k))
                .map(|k| (*var, k))
        })
        .collect();

    if let Some(key) = config.provider.api_key.as_ref().filter(|k| is_valid_key(k)) {
        found.push(("TOML", key.clone()));
    }

    if found.len() > 1 {
        let sources: Vec<&str> = found.iter().map(|(source, _)| *source).collect();
        warn!(
            "API key found in multiple sources: {}. Using {}.",
            sources.join(", "),
            sources[0]
        );
    }

    match found.into_iter().next() {
        Some((source, key)) => {
            info!("API key loaded from {}", source);
            Ok(key.trim().to_string())
        }
        None => Err(Error::Config(format!(
            "Provider API key not configured. Set one of:\n\
             1. Environment: {}=your-key\n\
             2. TOML config: [provider] api_key = \"your-key\"",
            API_KEY_ENV_VARS.join(" or ")
        ))),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
