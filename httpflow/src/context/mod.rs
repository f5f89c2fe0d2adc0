//! Per-call state.
//!
//! This module provides:
//! - [`CallContext`], the mutable state of one in-flight call
//! - the local chain mutation API and the execution engine behind `Next`
//! - [`ContextBag`], the call's key/value sidecar data

mod bags;
mod call;
#[cfg(test)]
mod context_tests;
mod engine;

pub use bags::ContextBag;
pub use call::CallContext;
