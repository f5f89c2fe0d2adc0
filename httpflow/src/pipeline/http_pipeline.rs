//! The immutable, shared pipeline.

use crate::chain::PolicyChain;
use crate::context::CallContext;
use crate::errors::PipelineError;
use crate::events::{get_event_sink, EventSink};
use crate::http::{HttpRequest, HttpResponse};
use crate::policy::{Policy, PolicyEntry};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Default cap on bulk patch passes.
pub const DEFAULT_MAX_PATCH_PASSES: usize = 32;

/// An ordered set of named policies in front of a transport.
///
/// A pipeline never changes after construction and can be shared across
/// tasks. Each call gets a [`CallContext`] holding a private copy of the
/// chain, so local edits made during one call never leak into another.
/// Cloning is cheap.
#[derive(Clone)]
pub struct HttpPipeline {
    pub(super) chain: Arc<PolicyChain>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) event_sink: Arc<dyn EventSink>,
    pub(super) max_patch_passes: usize,
}

impl HttpPipeline {
    /// Creates a pipeline from named policies.
    ///
    /// # Errors
    ///
    /// Returns `NameConflict` if two entries share a name, ignoring case.
    pub fn new(entries: Vec<PolicyEntry>, transport: Arc<dyn Transport>) -> Result<Self, PipelineError> {
        let chain = PolicyChain::from_entries(entries)?;
        Ok(Self::from_chain(
            chain,
            transport,
            get_event_sink(),
            DEFAULT_MAX_PATCH_PASSES,
        ))
    }

    /// Creates a pipeline from unnamed policies, naming each after its
    /// [`Policy::default_name`].
    ///
    /// # Errors
    ///
    /// Returns `NameConflict` if two derived names collide.
    pub fn from_policies(
        policies: Vec<Arc<dyn Policy>>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, PipelineError> {
        Self::new(policies.into_iter().map(PolicyEntry::unnamed).collect(), transport)
    }

    pub(super) fn from_chain(
        chain: PolicyChain,
        transport: Arc<dyn Transport>,
        event_sink: Arc<dyn EventSink>,
        max_patch_passes: usize,
    ) -> Self {
        debug!(policies = ?chain, "Pipeline built");
        Self {
            chain: Arc::new(chain),
            transport,
            event_sink,
            max_patch_passes,
        }
    }

    /// Returns a copy reporting events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns a copy with a different bulk patch pass cap.
    #[must_use]
    pub fn with_max_patch_passes(mut self, passes: usize) -> Self {
        self.max_patch_passes = passes.max(1);
        self
    }

    /// Creates the per-call context for `request`. No work is done until
    /// the context is sent.
    #[must_use]
    pub fn new_context(&self, request: HttpRequest) -> CallContext {
        CallContext::new(
            request,
            (*self.chain).clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.event_sink),
        )
    }

    /// Runs the context through its chain and the transport.
    ///
    /// Nothing happens until the returned future is polled. Dropping it
    /// before then issues no transport call.
    ///
    /// # Errors
    ///
    /// Whatever the chain produced, or `IllegalState` if the context was
    /// already sent.
    pub async fn send_request(&self, ctx: &mut CallContext) -> Result<HttpResponse, PipelineError> {
        ctx.dispatch().await
    }

    /// Creates a context for `request` and sends it.
    ///
    /// # Errors
    ///
    /// Whatever the chain produced.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PipelineError> {
        let mut ctx = self.new_context(request);
        ctx.dispatch().await
    }

    /// The pipeline's policies in order.
    #[must_use]
    pub fn policy_entries(&self) -> Vec<PolicyEntry> {
        self.chain.entries()
    }

    /// The pipeline's policy names in order.
    #[must_use]
    pub fn policy_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// The transport every call ends at.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Cap on bulk patch passes.
    #[must_use]
    pub fn max_patch_passes(&self) -> usize {
        self.max_patch_passes
    }
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("policies", &self.chain)
            .field("transport", &self.transport)
            .field("max_patch_passes", &self.max_patch_passes)
            .finish_non_exhaustive()
    }
}
