//! Cursor advance and chain execution.

use super::CallContext;
use crate::chain::{Cursor, NodeId, PolicyChain};
use crate::errors::{IllegalStateError, PipelineError};
use crate::events::event_types;
use crate::http::HttpResponse;
use crate::policy::{Next, Policy};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// What the cursor landed on.
enum Step {
    Policy {
        id: NodeId,
        name: String,
        policy: Arc<dyn Policy>,
    },
    Transport,
}

impl CallContext {
    /// Runs the whole chain for this context. A context runs at most once.
    pub(crate) async fn dispatch(&mut self) -> Result<HttpResponse, PipelineError> {
        if self.dispatched {
            return Err(IllegalStateError::new(format!(
                "Call '{}' was already sent; create a new context for another call",
                self.id
            ))
            .into());
        }
        self.dispatched = true;

        let span = info_span!(
            "httpflow.call",
            call_id = %self.id,
            method = %self.request.method(),
            url = %self.request.url(),
        );

        async move {
            self.emit(event_types::CALL_DISPATCHED, json!({ "call_id": self.id.to_string() }));
            info!(policies = self.chain.len(), "Dispatching call");

            let started = Instant::now();
            let result = self.proceed().await;
            let duration_ms = started.elapsed().as_millis();

            match &result {
                Ok(response) => {
                    info!(status = response.status(), duration_ms, "Call completed");
                    self.emit(
                        event_types::CALL_COMPLETED,
                        json!({
                            "call_id": self.id.to_string(),
                            "status": response.status(),
                            "duration_ms": duration_ms,
                        }),
                    );
                }
                Err(err) => {
                    warn!(error = %err, code = err.code(), duration_ms, "Call failed");
                    self.emit(
                        event_types::CALL_COMPLETED,
                        json!({
                            "call_id": self.id.to_string(),
                            "error": err.code(),
                            "duration_ms": duration_ms,
                        }),
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Advances the cursor and runs whatever it lands on.
    pub(crate) fn proceed(&mut self) -> BoxFuture<'_, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            self.check_cancelled()?;

            match self.advance()? {
                Step::Policy { id, name, policy } => {
                    debug!(policy = %name, "Entering policy");
                    self.emit(
                        event_types::POLICY_STARTED,
                        json!({ "call_id": self.id.to_string(), "policy": name }),
                    );
                    policy.process(&mut *self, Next::new(id, name)).await
                }
                Step::Transport => self.run_transport().await,
            }
        })
    }

    /// Copies the local chain for a later [`CallContext::rewind_to`].
    pub(crate) fn checkpoint(&self) -> PolicyChain {
        self.chain.snapshot()
    }

    /// Moves the cursor back onto `id` so the next advance re-enters its
    /// successor. With a checkpoint, the local chain is first reset to it.
    pub(crate) fn rewind_to(
        &mut self,
        id: NodeId,
        owner: &str,
        checkpoint: Option<&PolicyChain>,
    ) -> Result<(), PipelineError> {
        if let Some(chain) = checkpoint {
            self.chain = chain.snapshot();
        }
        if !self.chain.contains(id) {
            return Err(IllegalStateError::new(format!(
                "Policy '{owner}' is no longer part of the chain"
            ))
            .into());
        }
        debug!(
            policy = owner,
            restored = checkpoint.is_some(),
            "Rewinding cursor for replay"
        );
        self.cursor = Cursor::At(id);
        Ok(())
    }

    fn advance(&mut self) -> Result<Step, PipelineError> {
        let next = match self.cursor {
            Cursor::BeforeStart => self.chain.head(),
            Cursor::At(id) => self.chain.next(id),
            Cursor::Exhausted => {
                return Err(IllegalStateError::new("There are no more policies to execute").into())
            }
        };

        let Some(id) = next else {
            self.cursor = Cursor::Exhausted;
            return Ok(Step::Transport);
        };
        self.cursor = Cursor::At(id);

        match (self.chain.name(id), self.chain.policy(id)) {
            (Some(name), Some(policy)) => Ok(Step::Policy {
                id,
                name: name.to_string(),
                policy,
            }),
            _ => Err(IllegalStateError::new("Cursor points at a removed policy").into()),
        }
    }

    async fn run_transport(&mut self) -> Result<HttpResponse, PipelineError> {
        let transport = Arc::clone(&self.transport);
        let token = Arc::clone(&self.cancellation);
        let call_id = self.id.to_string();

        debug!("Invoking transport");
        self.emit(event_types::TRANSPORT_STARTED, json!({ "call_id": call_id }));

        let result = tokio::select! {
            result = transport.send(&mut *self) => result.map_err(PipelineError::from),
            () = token.cancelled() => Err(PipelineError::Cancelled(
                token.reason().unwrap_or_else(|| "cancelled".to_string()),
            )),
        };

        match &result {
            Ok(response) => {
                debug!(status = response.status(), "Transport returned");
                self.emit(
                    event_types::TRANSPORT_COMPLETED,
                    json!({ "call_id": call_id, "status": response.status() }),
                );
            }
            Err(err) => {
                debug!(error = %err, "Transport failed");
                self.emit(
                    event_types::TRANSPORT_COMPLETED,
                    json!({ "call_id": call_id, "error": err.code() }),
                );
            }
        }
        result
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancellation.is_cancelled() {
            let reason = self
                .cancellation
                .reason()
                .unwrap_or_else(|| "cancelled".to_string());
            debug!(reason = %reason, "Call cancelled before next step");
            return Err(PipelineError::Cancelled(reason));
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.event_sink.try_emit(event_type, Some(data));
    }
}
