//! Fluent pipeline construction.

use super::http_pipeline::{HttpPipeline, DEFAULT_MAX_PATCH_PASSES};
use super::retry::RetryConfig;
use super::retry_policy::RetryPolicy;
use crate::chain::PolicyChain;
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::events::{get_event_sink, EventSink};
use crate::policy::{Policy, PolicyEntry};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;

/// Name given to the retry policy installed from configuration.
pub const RETRY_POLICY_NAME: &str = "retry";

/// Builder for [`HttpPipeline`].
///
/// Name conflicts are reported by [`PipelineBuilder::build`].
pub struct PipelineBuilder {
    entries: Vec<PolicyEntry>,
    transport: Arc<dyn Transport>,
    event_sink: Option<Arc<dyn EventSink>>,
    max_patch_passes: usize,
    retry: Option<RetryConfig>,
}

impl PipelineBuilder {
    /// Starts a pipeline that ends at `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            entries: Vec::new(),
            transport,
            event_sink: None,
            max_patch_passes: DEFAULT_MAX_PATCH_PASSES,
            retry: None,
        }
    }

    /// Appends a named policy.
    #[must_use]
    pub fn with_policy(mut self, name: impl Into<String>, policy: Arc<dyn Policy>) -> Self {
        self.entries.push(PolicyEntry::new(name, policy));
        self
    }

    /// Appends a policy named after its [`Policy::default_name`].
    #[must_use]
    pub fn with_unnamed_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.entries.push(PolicyEntry::unnamed(policy));
        self
    }

    /// Sets the event sink. Defaults to the process-wide sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Installs a [`RetryPolicy`] named `retry` in front of every other
    /// policy.
    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Applies a loaded configuration.
    ///
    /// Sets the patch pass cap, and installs the retry policy when
    /// `retry.enabled` is set.
    #[must_use]
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.max_patch_passes = config.max_patch_passes.max(1);
        if config.retry.enabled {
            self.retry = Some(config.retry.clone());
        }
        self
    }

    /// Validates names and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `NameConflict` if two policies share a name, ignoring case.
    pub fn build(self) -> Result<HttpPipeline, PipelineError> {
        let retry = self.retry.map(|config| {
            PolicyEntry::new(RETRY_POLICY_NAME, Arc::new(RetryPolicy::new(config)))
        });
        let chain = PolicyChain::from_entries(retry.into_iter().chain(self.entries))?;

        Ok(HttpPipeline::from_chain(
            chain,
            self.transport,
            self.event_sink.unwrap_or_else(get_event_sink),
            self.max_patch_passes,
        ))
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("entries", &self.entries)
            .field("transport", &self.transport)
            .field("max_patch_passes", &self.max_patch_passes)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::testing::{test_request, CallLog, MockTransport, RecordingPolicy};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_builder_runs_policies_in_order() {
        let log = CallLog::new();
        let transport = Arc::new(MockTransport::ok().with_log(&log, "t"));
        let pipeline = PipelineBuilder::new(transport)
            .with_policy("A", RecordingPolicy::shared("A", &log))
            .with_unnamed_policy(RecordingPolicy::shared("B", &log))
            .build()
            .unwrap();

        assert_eq!(pipeline.policy_names(), vec!["A", "B"]);
        pipeline.send(test_request()).await.unwrap();
        assert_eq!(log.entries(), vec!["A", "B", "t"]);
    }

    #[test]
    fn test_builder_reports_conflicts() {
        let log = CallLog::new();
        let err = PipelineBuilder::new(Arc::new(MockTransport::ok()))
            .with_policy("auth", RecordingPolicy::shared("a", &log))
            .with_policy("AUTH", RecordingPolicy::shared("b", &log))
            .build()
            .unwrap_err();

        assert_eq!(err.code(), "POLICY-NAME-CONFLICT");
    }

    #[test]
    fn test_config_installs_retry_first() {
        let mut config = PipelineConfig::default();
        config.retry.enabled = true;
        config.max_patch_passes = 4;

        let log = CallLog::new();
        let pipeline = PipelineBuilder::new(Arc::new(MockTransport::ok()))
            .with_policy("auth", RecordingPolicy::shared("auth", &log))
            .with_config(&config)
            .build()
            .unwrap();

        assert_eq!(pipeline.policy_names(), vec!["retry", "auth"]);
        assert_eq!(pipeline.max_patch_passes(), 4);
    }

    #[test]
    fn test_disabled_retry_is_not_installed() {
        let pipeline = PipelineBuilder::new(Arc::new(MockTransport::ok()))
            .with_config(&PipelineConfig::default())
            .build()
            .unwrap();

        assert!(pipeline.policy_names().is_empty());
    }
}
