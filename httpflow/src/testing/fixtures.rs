//! Shared fixtures for pipeline tests.

use std::sync::Arc;

use super::{CallLog, RecordingPolicy};
use crate::http::{HttpMethod, HttpRequest};
use crate::pipeline::HttpPipeline;
use crate::policy::PolicyEntry;
use crate::transport::Transport;

/// URL used by [`test_request`].
pub const TEST_URL: &str = "http://localhost/";

/// A GET request to [`TEST_URL`].
#[must_use]
pub fn test_request() -> HttpRequest {
    match HttpRequest::parse(HttpMethod::Get, TEST_URL) {
        Ok(request) => request,
        Err(err) => panic!("invalid test URL: {err}"),
    }
}

/// A pipeline of [`RecordingPolicy`]s, each named and labelled after an
/// entry of `names`.
///
/// # Panics
///
/// Panics if `names` contains duplicates.
#[must_use]
pub fn test_pipeline(names: &[&str], log: &CallLog, transport: Arc<dyn Transport>) -> HttpPipeline {
    let entries = names
        .iter()
        .map(|name| PolicyEntry::new(*name, RecordingPolicy::shared(*name, log)))
        .collect();
    match HttpPipeline::new(entries, transport) {
        Ok(pipeline) => pipeline,
        Err(err) => panic!("invalid test pipeline: {err}"),
    }
}
