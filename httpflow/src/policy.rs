//! Policy contract and the `Next` continuation handle.
//!
//! A policy receives the call's [`CallContext`] and a [`Next`] handle. It may
//! inspect or edit the request, edit the rest of the chain, forward the call
//! with [`Next::process`], and inspect or replace the response on the way
//! back. Not calling `next` short-circuits the chain.

use crate::chain::{NodeId, PolicyChain};
use crate::context::CallContext;
use crate::errors::{IllegalStateError, PipelineError};
use crate::http::HttpResponse;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// A unit of request/response processing.
#[async_trait]
pub trait Policy: Send + Sync + Debug {
    /// Name used when the policy is added without an explicit one.
    ///
    /// Defaults to the unqualified type name.
    fn default_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Processes the call.
    ///
    /// Implementations call `next.process(ctx)` at most once to continue the
    /// chain.
    async fn process(&self, ctx: &mut CallContext, next: Next)
        -> Result<HttpResponse, PipelineError>;
}

fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Continuation handle passed to [`Policy::process`].
///
/// Bound to the node that received it. The first [`Next::process`] advances
/// the cursor past that node; a second one is an `IllegalState` fault.
#[derive(Debug)]
pub struct Next {
    origin: NodeId,
    policy_name: String,
    invoked: bool,
    checkpoint: Option<PolicyChain>,
}

impl Next {
    pub(crate) fn new(origin: NodeId, policy_name: String) -> Self {
        Self {
            origin,
            policy_name,
            invoked: false,
            checkpoint: None,
        }
    }

    /// Name of the policy this handle was given to.
    #[must_use]
    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// Returns true once the chain has been continued through this handle.
    #[must_use]
    pub fn is_invoked(&self) -> bool {
        self.invoked
    }

    /// Continues the chain with the next policy, or the transport after the
    /// last one.
    pub async fn process(&mut self, ctx: &mut CallContext) -> Result<HttpResponse, PipelineError> {
        if self.invoked {
            return Err(IllegalStateError::next_reinvoked(&self.policy_name).into());
        }
        self.invoked = true;
        ctx.proceed().await
    }

    /// Runs the downstream segment of the chain, repeatably.
    ///
    /// The first `replay` records the local chain as it is now, then
    /// continues like `process`. Each later `replay` restores that recording,
    /// moves the cursor back onto the owning node and continues from there,
    /// so every run sees the same downstream chain. Local edits made by an
    /// earlier run are discarded.
    ///
    /// After a plain [`Next::process`] nothing was recorded; `replay` then
    /// only moves the cursor back and earlier edits stay in the chain.
    pub async fn replay(&mut self, ctx: &mut CallContext) -> Result<HttpResponse, PipelineError> {
        if !self.invoked {
            self.checkpoint = Some(ctx.checkpoint());
            return self.process(ctx).await;
        }
        ctx.rewind_to(self.origin, &self.policy_name, self.checkpoint.as_ref())?;
        ctx.proceed().await
    }
}

/// A named policy, the unit a pipeline is built from.
#[derive(Clone)]
pub struct PolicyEntry {
    /// Policy name, unique case-insensitively within a chain.
    pub name: String,
    /// The policy itself.
    pub policy: Arc<dyn Policy>,
}

impl PolicyEntry {
    /// Creates an entry with an explicit name.
    pub fn new(name: impl Into<String>, policy: Arc<dyn Policy>) -> Self {
        Self {
            name: name.into(),
            policy,
        }
    }

    /// Creates an entry named after the policy's [`Policy::default_name`].
    pub fn unnamed(policy: Arc<dyn Policy>) -> Self {
        Self {
            name: policy.default_name(),
            policy,
        }
    }
}

impl Debug for PolicyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyEntry")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// A policy built from a closure that runs before forwarding the call.
///
/// Returning an error from the closure short-circuits the chain.
pub struct FnPolicy<F>
where
    F: Fn(&mut CallContext) -> Result<(), PipelineError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&mut CallContext) -> Result<(), PipelineError> + Send + Sync,
{
    /// Creates a closure policy.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnPolicy<F>
where
    F: Fn(&mut CallContext) -> Result<(), PipelineError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Policy for FnPolicy<F>
where
    F: Fn(&mut CallContext) -> Result<(), PipelineError> + Send + Sync,
{
    fn default_name(&self) -> String {
        self.name.clone()
    }

    async fn process(
        &self,
        ctx: &mut CallContext,
        mut next: Next,
    ) -> Result<HttpResponse, PipelineError> {
        (self.func)(ctx)?;
        next.process(ctx).await
    }
}
