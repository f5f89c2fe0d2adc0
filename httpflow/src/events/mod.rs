//! Call lifecycle events.
//!
//! Pipelines capture an [`EventSink`] when they are built and hand it to every
//! context they create. The engine reports each step through
//! [`EventSink::try_emit`], so a slow or failing sink never stalls a call.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use parking_lot::RwLock;
use std::sync::Arc;

/// Event type names emitted by the pipeline.
pub mod event_types {
    /// A context was handed to `send_request`.
    pub const CALL_DISPATCHED: &str = "call.dispatched";
    /// A dispatched call produced a response or a fault.
    pub const CALL_COMPLETED: &str = "call.completed";
    /// The cursor advanced onto a policy.
    pub const POLICY_STARTED: &str = "policy.started";
    /// The cursor ran past the last policy and the transport was invoked.
    pub const TRANSPORT_STARTED: &str = "transport.started";
    /// The transport returned.
    pub const TRANSPORT_COMPLETED: &str = "transport.completed";
    /// A context's local chain was edited.
    pub const CHAIN_MUTATED: &str = "chain.mutated";
    /// A bulk patch skipped a conflicting entry.
    pub const PATCH_CONFLICT: &str = "patch.conflict";
    /// The retry policy scheduled another attempt.
    pub const RETRY_SCHEDULED: &str = "retry.scheduled";
}

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide default event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide default event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Gets the process-wide default event sink.
///
/// Returns a `NoOpEventSink` if no sink is set.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}
