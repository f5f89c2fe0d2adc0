//! The terminal step of every call.
//!
//! The transport performs the actual network exchange. The engine invokes it
//! exactly once per pass through the chain, after the last policy forwards.

use crate::context::CallContext;
use crate::errors::TransportError;
use crate::http::HttpResponse;
use async_trait::async_trait;
use std::fmt::Debug;

#[cfg(feature = "reqwest-transport")]
mod reqwest_transport;

#[cfg(feature = "reqwest-transport")]
pub use reqwest_transport::ReqwestTransport;

/// Sends the fully resolved request held by the context.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Sends `ctx.request()` and returns the response.
    async fn send(&self, ctx: &mut CallContext) -> Result<HttpResponse, TransportError>;
}
