//! Pipeline configuration loaded from JSON.
//!
//! Every field has a default, so a partial document (or `{}`) is valid.
//!
//! ```json
//! {
//!   "retry": { "enabled": true, "max_retries": 5 },
//!   "max_patch_passes": 16,
//!   "logging": { "level": "debug", "format": "json" }
//! }
//! ```

use crate::errors::PipelineError;
use crate::pipeline::{RetryConfig, DEFAULT_MAX_PATCH_PASSES};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

fn default_max_patch_passes() -> usize {
    DEFAULT_MAX_PATCH_PASSES
}

fn default_level() -> String {
    "info".to_string()
}

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Settings for [`crate::observability::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `HTTPFLOW_LOG` is unset, e.g. `info` or
    /// `httpflow=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retry policy settings. Installed only when `retry.enabled` is set.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Cap on bulk patch passes.
    #[serde(default = "default_max_patch_passes")]
    pub max_patch_passes: usize,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            max_patch_passes: default_max_patch_passes(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the document is not valid JSON or has a field of
    /// the wrong type.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("Invalid pipeline config: {e}")))
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read config '{}': {e}", path.display()))
        })?;
        let config = Self::from_json_str(&contents)?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }
}
