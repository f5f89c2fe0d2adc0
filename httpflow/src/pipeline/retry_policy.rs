//! Generic retry policy.

use super::retry::{RetryConfig, RetryPredicate, RetryState, StatusCodePredicate};
use crate::context::CallContext;
use crate::errors::{IllegalStateError, PipelineError, TransportError};
use crate::events::event_types;
use crate::http::{HttpRequest, HttpResponse};
use crate::policy::{Next, Policy};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Data bag key holding the current attempt number (1 for the first).
pub const RETRY_ATTEMPT_KEY: &str = "httpflow.retry.attempt";

/// Re-sends the downstream chain while the predicate asks for it, and on
/// transport faults until `max_retries` is used up.
///
/// Every attempt sends a fresh clone of the request as it looked when the
/// policy was entered, through the downstream chain as it looked when the
/// policy first forwarded. Policies added downstream during one attempt are
/// gone again at the start of the next.
///
/// A streaming body is read into memory before the first attempt, so even
/// the first attempt sends buffered bytes rather than the original stream.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    predicate: Arc<dyn RetryPredicate>,
}

impl RetryPolicy {
    /// Creates a retry policy that retries the statuses listed in `config`.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        let predicate = Arc::new(StatusCodePredicate::new(config.clone()));
        Self { config, predicate }
    }

    /// Replaces the response predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// The retry configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn fresh_request(template: &HttpRequest) -> Result<HttpRequest, PipelineError> {
        template
            .try_clone()
            .ok_or_else(|| IllegalStateError::new("Retry request body is not replayable").into())
    }

    async fn wait(ctx: &CallContext, delay: Duration) -> Result<(), PipelineError> {
        let token = Arc::clone(ctx.cancellation_token());
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = token.cancelled() => Err(PipelineError::Cancelled(
                token.reason().unwrap_or_else(|| "cancelled".to_string()),
            )),
        }
    }
}

#[async_trait]
impl Policy for RetryPolicy {
    fn default_name(&self) -> String {
        "retry".to_string()
    }

    async fn process(
        &self,
        ctx: &mut CallContext,
        mut next: Next,
    ) -> Result<HttpResponse, PipelineError> {
        if !ctx.request().is_restartable() {
            ctx.request_mut()
                .buffer_body()
                .await
                .map_err(TransportError::from)?;
        }
        let template = Self::fresh_request(ctx.request())?;
        let mut state = RetryState::new();

        loop {
            let attempt = state.attempt + 1;
            ctx.replace_request(Self::fresh_request(&template)?);
            ctx.data().set(RETRY_ATTEMPT_KEY, json!(attempt));

            let result = next.replay(ctx).await;

            let delay = match &result {
                Ok(response) => self.predicate.should_retry(response, attempt),
                Err(err) if err.is_transport() && !state.is_exhausted(&self.config) => {
                    Some(state.calculate_delay(&self.config))
                }
                Err(_) => None,
            };

            let Some(delay) = delay else {
                debug!(attempt, success = result.is_ok(), "Retry policy done");
                return result;
            };

            let reason = match &result {
                Ok(response) => format!("status {}", response.status()),
                Err(err) => err.to_string(),
            };
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Scheduling retry"
            );
            ctx.event_sink().try_emit(
                event_types::RETRY_SCHEDULED,
                Some(json!({
                    "call_id": ctx.id().to_string(),
                    "attempt": attempt,
                    "delay_ms": delay.as_millis() as u64,
                    "reason": reason,
                })),
            );

            drop(result);
            state.increment();
            Self::wait(ctx, delay).await?;
        }
    }
}
