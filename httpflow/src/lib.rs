//! # Httpflow
//!
//! An HTTP client pipeline built from named, composable policies.
//!
//! A pipeline is an ordered chain of policies in front of a transport.
//! Each call gets its own context holding a private copy of that chain, with
//! support for:
//!
//! - **Per-call edits**: insert, append or replace policies for one call,
//!   even while it runs, without touching the shared pipeline
//! - **Bulk patching**: derive a new pipeline from an existing one through a
//!   reconciliation callback
//! - **Generic retry**: re-run the downstream chain with backoff and jitter
//! - **Event-driven observability**: lifecycle events and `tracing` spans
//! - **Cancellation**: cooperative cancellation checked at every step
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use httpflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new(Arc::new(ReqwestTransport::new()))
//!     .with_policy("auth", Arc::new(AuthPolicy::new(token)))
//!     .with_retry(RetryConfig::new())
//!     .build()?;
//!
//! let mut ctx = pipeline.new_context(HttpRequest::parse(HttpMethod::Get, url)?);
//! ctx.add_policy_after("auth", "trace", Arc::new(TracePolicy))?;
//! let response = pipeline.send_request(&mut ctx).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod chain;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod http;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod testing;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{LogFormat, LoggingConfig, PipelineConfig};
    pub use crate::context::{CallContext, ContextBag};
    pub use crate::errors::{
        IllegalStateError, NameConflictError, PipelineError, PolicyNotFoundError, TransportError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::http::{Body, HttpHeaders, HttpMethod, HttpRequest, HttpResponse};
    pub use crate::pipeline::{
        BackoffStrategy, HttpPipeline, JitterStrategy, PatchAction, PatchPolicies,
        PipelineBuilder, PolicyPatch, RetryConfig, RetryPolicy,
    };
    pub use crate::policy::{FnPolicy, Next, Policy, PolicyEntry};
    #[cfg(feature = "reqwest-transport")]
    pub use crate::transport::ReqwestTransport;
    pub use crate::transport::Transport;
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testing::{test_request, MockTransport};

    #[derive(Debug)]
    struct Tag;

    #[async_trait]
    impl Policy for Tag {
        async fn process(
            &self,
            ctx: &mut CallContext,
            mut next: Next,
        ) -> Result<HttpResponse, PipelineError> {
            ctx.request_mut().headers_mut().set("x-tag", "1");
            next.process(ctx).await
        }
    }

    #[tokio::test]
    async fn test_prelude_is_enough_for_a_policy() {
        let pipeline = PipelineBuilder::new(Arc::new(MockTransport::ok()))
            .with_unnamed_policy(Arc::new(Tag))
            .build()
            .unwrap();

        assert_eq!(pipeline.policy_names(), vec!["Tag"]);
        assert!(pipeline.send(test_request()).await.unwrap().is_success());
    }
}
