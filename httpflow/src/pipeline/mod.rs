//! Pipeline building and execution.
//!
//! This module provides:
//! - [`HttpPipeline`], the immutable, shareable chain of named policies
//! - [`PipelineBuilder`] with config-driven retry installation
//! - the bulk patch engine ([`PatchPolicies`], [`PolicyPatch`])
//! - the generic [`RetryPolicy`] and its backoff configuration

mod builder;
mod http_pipeline;
mod patch;
mod retry;
mod retry_policy;

pub use builder::{PipelineBuilder, RETRY_POLICY_NAME};
pub use http_pipeline::{HttpPipeline, DEFAULT_MAX_PATCH_PASSES};
pub use patch::{PatchAction, PatchFailure, PatchPolicies, PolicyPatch};
pub use retry::{
    BackoffStrategy, JitterStrategy, RetryConfig, RetryPredicate, RetryState, StatusCodePredicate,
};
pub use retry_policy::{RetryPolicy, RETRY_ATTEMPT_KEY};
