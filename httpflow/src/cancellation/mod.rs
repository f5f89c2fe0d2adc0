//! Cooperative cancellation for in-flight calls.
//!
//! Every [`CallContext`](crate::context::CallContext) owns a shared
//! [`CancellationToken`]. The engine checks it before each policy step and
//! before the transport; a cancelled call completes with
//! [`PipelineError::Cancelled`](crate::errors::PipelineError::Cancelled).

mod token;

pub use token::{CancelCallback, CancellationToken};
