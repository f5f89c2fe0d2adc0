//! Per-call state and the local chain mutation API.

use super::ContextBag;
use crate::cancellation::CancellationToken;
use crate::chain::{Cursor, PolicyChain};
use crate::errors::{IllegalStateError, NameConflictError, PipelineError, PolicyNotFoundError};
use crate::events::{event_types, EventSink};
use crate::http::HttpRequest;
use crate::policy::{Policy, PolicyEntry};
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// State for one logical call.
///
/// Holds the request, a private copy of the pipeline's policy chain, the
/// execution cursor and a data bag shared by the policies. Policies may edit
/// the local chain while the call runs, as long as the edit only touches
/// positions the cursor has not passed yet.
pub struct CallContext {
    pub(super) id: Uuid,
    pub(super) request: HttpRequest,
    pub(super) chain: PolicyChain,
    pub(super) cursor: Cursor,
    pub(super) data: ContextBag,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) cancellation: Arc<CancellationToken>,
    pub(super) event_sink: Arc<dyn EventSink>,
    pub(super) dispatched: bool,
}

impl CallContext {
    pub(crate) fn new(
        request: HttpRequest,
        chain: PolicyChain,
        transport: Arc<dyn Transport>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            chain,
            cursor: Cursor::BeforeStart,
            data: ContextBag::new(),
            transport,
            cancellation: Arc::new(CancellationToken::new()),
            event_sink,
            dispatched: false,
        }
    }

    /// Replaces the cancellation token, e.g. to share one across calls.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Unique id of this call.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The outbound request.
    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// The outbound request, for policies that edit it.
    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    /// Swaps in a new request and returns the previous one.
    pub fn replace_request(&mut self, request: HttpRequest) -> HttpRequest {
        std::mem::replace(&mut self.request, request)
    }

    /// Sidecar data for this call.
    #[must_use]
    pub fn data(&self) -> &ContextBag {
        &self.data
    }

    /// The call's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &Arc<CancellationToken> {
        &self.cancellation
    }

    /// Cancels the call. Steps that have not started yet will not run.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancellation.cancel(reason);
    }

    /// The sink events for this call are reported to.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Global and local policies in their current order.
    #[must_use]
    pub fn policy_entries(&self) -> Vec<PolicyEntry> {
        self.chain.entries()
    }

    /// Policy names in their current order.
    #[must_use]
    pub fn policy_names(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Returns true once the first policy (or the transport, for an empty
    /// chain) has been entered.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.cursor != Cursor::BeforeStart
    }

    /// Name of the policy under the cursor.
    #[must_use]
    pub fn current_policy(&self) -> Option<&str> {
        match self.cursor {
            Cursor::At(id) => self.chain.name(id),
            Cursor::BeforeStart | Cursor::Exhausted => None,
        }
    }

    /// Inserts a policy at the head of the local chain.
    ///
    /// # Errors
    ///
    /// `IllegalState` once execution has started, `NameConflict` if the name
    /// is taken.
    pub fn add_policy_first(
        &mut self,
        name: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.is_started() {
            return Err(IllegalStateError::already_started(&name).into());
        }
        if self.chain.contains_name(&name) {
            return Err(NameConflictError::new(name).into());
        }

        self.chain.push_front(PolicyEntry::new(name.clone(), policy));
        self.mutated("add_first", None, &name);
        Ok(())
    }

    /// Appends a policy at the tail of the local chain. Allowed at any time.
    ///
    /// # Errors
    ///
    /// `NameConflict` if the name is taken.
    pub fn add_policy_last(
        &mut self,
        name: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.chain.contains_name(&name) {
            return Err(NameConflictError::new(name).into());
        }

        self.chain.push_back(PolicyEntry::new(name.clone(), policy));
        self.mutated("add_last", None, &name);
        Ok(())
    }

    /// Inserts a policy right after `base_name`.
    ///
    /// # Errors
    ///
    /// `NameConflict` if the name is taken, `NotFound` if the base is
    /// missing, `IllegalState` if the cursor already moved past the base.
    pub fn add_policy_after(
        &mut self,
        base_name: &str,
        name: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        let found = self.chain.lookup(base_name, &name, self.cursor);
        if found.name_exists {
            return Err(NameConflictError::new(name).into());
        }
        let Some(base) = found.base else {
            return Err(PolicyNotFoundError::new(base_name).into());
        };
        if !found.cursor_before_base {
            return Err(IllegalStateError::after_executed(base_name, &name).into());
        }

        self.chain.insert_after(base, PolicyEntry::new(name.clone(), policy));
        self.mutated("add_after", Some(base_name), &name);
        Ok(())
    }

    /// Inserts a policy right before `base_name`.
    ///
    /// # Errors
    ///
    /// `NameConflict` if the name is taken, `NotFound` if the base is
    /// missing, `IllegalState` if the base has already started.
    pub fn add_policy_before(
        &mut self,
        base_name: &str,
        name: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        let found = self.chain.lookup(base_name, &name, self.cursor);
        if found.name_exists {
            return Err(NameConflictError::new(name).into());
        }
        let Some(base) = found.base else {
            return Err(PolicyNotFoundError::new(base_name).into());
        };
        if !found.cursor_before_base || self.cursor == Cursor::At(base) {
            return Err(IllegalStateError::before_executed(base_name, &name).into());
        }

        self.chain.insert_before(base, PolicyEntry::new(name.clone(), policy));
        self.mutated("add_before", Some(base_name), &name);
        Ok(())
    }

    /// Replaces `base_name` with a new policy in the same position.
    ///
    /// The new name may equal the base name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the base is missing, `NameConflict` if the name is taken
    /// by another policy, `IllegalState` if the base has already started.
    pub fn replace_policy(
        &mut self,
        base_name: &str,
        name: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        let found = self.chain.lookup(base_name, &name, self.cursor);
        let Some(base) = found.base else {
            return Err(PolicyNotFoundError::new(base_name).into());
        };
        if found.name_exists && base_name.to_lowercase() != name.to_lowercase() {
            return Err(NameConflictError::new(name).into());
        }
        if !found.cursor_before_base || self.cursor == Cursor::At(base) {
            return Err(IllegalStateError::replace_executed(base_name).into());
        }

        self.chain.replace(base, PolicyEntry::new(name.clone(), policy));
        self.mutated("replace", Some(base_name), &name);
        Ok(())
    }

    fn mutated(&self, operation: &str, base: Option<&str>, name: &str) {
        debug!(
            call_id = %self.id,
            operation,
            base = ?base,
            policy = name,
            "Local policy chain changed"
        );
        self.event_sink.try_emit(
            event_types::CHAIN_MUTATED,
            Some(serde_json::json!({
                "call_id": self.id.to_string(),
                "operation": operation,
                "base": base,
                "policy": name,
            })),
        );
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.id)
            .field("method", &self.request.method())
            .field("url", &self.request.url().as_str())
            .field("policies", &self.chain)
            .field("cursor", &self.cursor)
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}
