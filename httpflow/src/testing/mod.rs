//! Testing utilities for httpflow pipelines.
//!
//! This module provides:
//! - A shared call log and a policy that records into it
//! - Scripted, failing and slow transports
//! - Request and pipeline fixtures

mod fixtures;
mod mocks;

pub use fixtures::{test_pipeline, test_request, TEST_URL};
pub use mocks::{
    CallLog, FailingTransport, MockTransport, RecordingPolicy, ScriptedReply, SlowTransport,
};
