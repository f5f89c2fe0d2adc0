//! Retry configuration with configurable backoff and jitter strategies.
//!
//! Delays grow with the retry index according to [`BackoffStrategy`], are
//! capped at `max_delay_ms`, then spread with [`JitterStrategy`].

use crate::http::HttpResponse;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

fn default_max_retries() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    800
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_retry_on_status() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}

/// Configuration for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Whether `PipelineBuilder::with_config` installs a retry policy.
    #[serde(default)]
    pub enabled: bool,
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base delay between retries in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff strategy.
    #[serde(default)]
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter_strategy: JitterStrategy,
    /// Response statuses that trigger a retry.
    #[serde(default = "default_retry_on_status")]
    pub retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_strategy: BackoffStrategy::default(),
            jitter_strategy: JitterStrategy::default(),
            retry_on_status: default_retry_on_status(),
        }
    }
}

impl RetryConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the retry policy.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Sets the statuses that trigger a retry.
    #[must_use]
    pub fn with_retry_on_status(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retry_on_status = statuses.into();
        self
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Retries already scheduled (0 during the first attempt).
    pub attempt: usize,
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Creates a fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that another retry was scheduled.
    pub fn increment(&mut self) {
        self.attempt += 1;
    }

    /// Returns true if no retries are left.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_retries
    }

    /// Calculates the delay before the next retry.
    #[must_use]
    pub fn calculate_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let exponent = u32::try_from(self.attempt).unwrap_or(u32::MAX);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(exponent)),
            BackoffStrategy::Linear => base.saturating_mul(self.attempt as u64 + 1),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base.min(max)
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }
}

/// Decides whether a response should be retried.
pub trait RetryPredicate: Send + Sync + Debug {
    /// Returns the delay before the next attempt, or `None` to accept the
    /// response. `attempt` is 1 for the first attempt.
    fn should_retry(&self, response: &HttpResponse, attempt: usize) -> Option<Duration>;
}

/// Retries responses whose status is listed in [`RetryConfig::retry_on_status`].
///
/// A numeric `Retry-After` header overrides the computed delay, capped at
/// `max_delay_ms`.
#[derive(Debug, Clone)]
pub struct StatusCodePredicate {
    config: RetryConfig,
}

impl StatusCodePredicate {
    /// Creates a predicate driven by `config`.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryPredicate for StatusCodePredicate {
    fn should_retry(&self, response: &HttpResponse, attempt: usize) -> Option<Duration> {
        if attempt > self.config.max_retries
            || !self.config.retry_on_status.contains(&response.status())
        {
            return None;
        }

        let retry_after = response
            .header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000).min(self.config.max_delay_ms));
        if let Some(ms) = retry_after {
            return Some(Duration::from_millis(ms));
        }

        let mut state = RetryState {
            attempt: attempt.saturating_sub(1),
            previous_delay_ms: None,
        };
        Some(state.calculate_delay(&self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base: u64) -> RetryConfig {
        RetryConfig::new()
            .with_base_delay_ms(base)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter_strategy, JitterStrategy::Full);
        assert!(config.retry_on_status.contains(&503));
    }

    #[test]
    fn test_retry_config_deserializes_partial() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"enabled": true, "backoff_strategy": "linear"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_exponential_delay() {
        let config = no_jitter(100);
        let mut state = RetryState::new();

        assert_eq!(state.calculate_delay(&config), Duration::from_millis(100));
        state.increment();
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(200));
        state.increment();
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(400));
    }

    #[test]
    fn test_linear_and_constant_delay() {
        let linear = no_jitter(100).with_backoff(BackoffStrategy::Linear);
        let constant = no_jitter(100).with_backoff(BackoffStrategy::Constant);
        let mut state = RetryState { attempt: 2, previous_delay_ms: None };

        assert_eq!(state.calculate_delay(&linear), Duration::from_millis(300));
        assert_eq!(state.calculate_delay(&constant), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = no_jitter(1000).with_max_delay_ms(5000);
        let mut state = RetryState { attempt: 10, previous_delay_ms: None };
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(5000));
    }

    #[test]
    fn test_full_jitter_stays_in_range() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant);
        let mut state = RetryState::new();

        for _ in 0..10 {
            assert!(state.calculate_delay(&config) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_decorrelated_jitter_bounds() {
        let config = RetryConfig::new()
            .with_base_delay_ms(10)
            .with_max_delay_ms(1000)
            .with_jitter(JitterStrategy::Decorrelated);
        let mut state = RetryState::new();

        for _ in 0..10 {
            let delay = state.calculate_delay(&config);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_exhaustion() {
        let config = RetryConfig::new().with_max_retries(2);
        let mut state = RetryState::new();
        assert!(!state.is_exhausted(&config));
        state.increment();
        state.increment();
        assert!(state.is_exhausted(&config));
    }

    #[test]
    fn test_status_predicate() {
        let predicate = StatusCodePredicate::new(no_jitter(5).with_max_retries(2));

        assert_eq!(
            predicate.should_retry(&HttpResponse::new(503), 1),
            Some(Duration::from_millis(5))
        );
        assert_eq!(
            predicate.should_retry(&HttpResponse::new(503), 2),
            Some(Duration::from_millis(10))
        );
        assert_eq!(predicate.should_retry(&HttpResponse::new(503), 3), None);
        assert_eq!(predicate.should_retry(&HttpResponse::new(404), 1), None);
    }

    #[test]
    fn test_status_predicate_honours_retry_after() {
        let predicate = StatusCodePredicate::new(no_jitter(5).with_max_delay_ms(1500));
        let response = HttpResponse::new(429).with_header("Retry-After", "1");
        assert_eq!(predicate.should_retry(&response, 1), Some(Duration::from_millis(1000)));

        let response = HttpResponse::new(429).with_header("Retry-After", "30");
        assert_eq!(predicate.should_retry(&response, 1), Some(Duration::from_millis(1500)));
    }
}
