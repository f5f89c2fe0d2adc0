//! Inbound HTTP response.

use super::{Body, HttpHeaders};
use bytes::Bytes;
use std::io;

/// A response produced by the transport and carried back up the chain.
#[derive(Debug)]
pub struct HttpResponse {
    status: u16,
    headers: HttpHeaders,
    body: Body,
}

impl HttpResponse {
    /// Creates a response with no headers and an empty body.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: Body::Empty,
        }
    }

    /// Sets one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HttpHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    /// Returns the headers for mutation.
    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// Returns a header value.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.value(name)
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Takes the body, leaving an empty one.
    pub fn take_body(&mut self) -> Body {
        self.body.take()
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes, io::Error> {
        self.body.collect().await
    }

    /// Reads the whole body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> Result<String, io::Error> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
