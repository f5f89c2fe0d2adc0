//! `tracing-subscriber` setup for applications embedding httpflow.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides [`LoggingConfig::level`].
pub const LOG_ENV_VAR: &str = "HTTPFLOW_LOG";

/// Builds the filter: `HTTPFLOW_LOG` if set and valid, else the configured
/// level, else `info`.
#[must_use]
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global subscriber with a filter and a pretty or JSON format
/// layer.
///
/// Returns `false` if a global subscriber was already set; the existing one
/// is kept.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(build_env_filter(config));

    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init().is_ok(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(level = %config.level, format = ?config.format, "Logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        if std::env::var_os(LOG_ENV_VAR).is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "httpflow=verbose".to_string(),
            format: LogFormat::Json,
        };
        assert_eq!(build_env_filter(&config).to_string(), "info");
    }
}
