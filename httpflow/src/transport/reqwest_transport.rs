//! Transport backed by `reqwest`.

use super::Transport;
use crate::context::CallContext;
use crate::errors::TransportError;
use crate::http::{HttpHeaders, HttpResponse};
use async_trait::async_trait;
use tracing::debug;

/// Sends requests through a shared [`reqwest::Client`].
///
/// The request body is buffered before sending; streaming uploads are not
/// forwarded chunk by chunk.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::body(err.to_string())
    } else {
        TransportError::other(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, ctx: &mut CallContext) -> Result<HttpResponse, TransportError> {
        let request = ctx.request_mut();
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())
            .map_err(|e| TransportError::other(e.to_string()))?;

        let body = match request.body().try_clone() {
            Some(body) => body,
            None => request.take_body(),
        };
        let body = body.collect().await?;

        let mut builder = self.client.request(method, request.url().clone());
        for header in request.headers().iter() {
            builder = builder.header(header.name(), header.value());
        }

        debug!(method = %request.method(), url = %request.url(), "Sending request");
        let response = builder.body(body).send().await.map_err(|e| map_error(&e))?;

        let status = response.status().as_u16();
        let mut headers = HttpHeaders::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                debug!(header = %name, "Dropping response header that is not valid UTF-8");
                continue;
            };
            let joined = match headers.value(name.as_str()) {
                Some(existing) => format!("{existing}, {value}"),
                None => value.to_string(),
            };
            headers.set(name.as_str(), joined);
        }

        let bytes = response.bytes().await.map_err(|e| map_error(&e))?;
        Ok(HttpResponse::new(status).with_headers(headers).with_body(bytes))
    }
}
