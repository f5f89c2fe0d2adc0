//! Observability utilities.

mod logging;

pub use logging::{build_env_filter, init_logging, LOG_ENV_VAR};
