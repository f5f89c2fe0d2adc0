//! Outbound HTTP request.

use super::{Body, HttpHeaders, HttpMethod};
use bytes::Bytes;
use std::io;
use url::Url;

/// An outbound request.
///
/// `restartable` tells a retry policy whether the body can be resent
/// without asking the caller for it again.
#[derive(Debug)]
pub struct HttpRequest {
    method: HttpMethod,
    url: Url,
    headers: HttpHeaders,
    body: Body,
    restartable: bool,
}

impl HttpRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HttpHeaders::new(),
            body: Body::Empty,
            restartable: true,
        }
    }

    /// Creates a request by parsing a URL string.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `url` is not absolute and valid.
    pub fn parse(method: HttpMethod, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Sets the method.
    #[must_use]
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the URL.
    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HttpHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Sets one header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets a buffered body and its `Content-Length`.
    #[must_use]
    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        self.headers.set("Content-Length", bytes.len().to_string());
        self.body = Body::Bytes(bytes);
        self.restartable = true;
        self
    }

    /// Sets an arbitrary body. Streams mark the request as not restartable.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.restartable = body.is_replayable();
        self.body = body;
        self
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
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

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Takes the body, leaving an empty one.
    pub fn take_body(&mut self) -> Body {
        self.body.take()
    }

    /// Returns true if the body can be resent.
    #[must_use]
    pub fn is_restartable(&self) -> bool {
        self.restartable
    }

    /// Buffers a streaming body in memory and marks the request restartable.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while reading the stream.
    pub async fn buffer_body(&mut self) -> Result<(), io::Error> {
        if !self.body.is_replayable() {
            let bytes = self.body.take().collect().await?;
            self.body = Body::Bytes(bytes);
        }
        self.restartable = true;
        Ok(())
    }

    /// Clones method, URL, headers and a replayable body.
    ///
    /// Returns `None` while the body is an unbuffered stream.
    #[must_use]
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
            restartable: self.restartable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn request() -> HttpRequest {
        HttpRequest::parse(HttpMethod::Get, "http://contoso.com").unwrap()
    }

    #[test]
    fn test_with_bytes_sets_content_length() {
        let req = request().with_bytes("hello");
        assert_eq!(req.headers().value("content-length"), Some("5"));
        assert!(req.is_restartable());
    }

    #[tokio::test]
    async fn test_stream_body_needs_buffering_before_clone() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![Ok(Bytes::from_static(b"abc"))];
        let mut req = request()
            .with_method(HttpMethod::Post)
            .with_body(Body::from_stream(stream::iter(chunks)));

        assert!(!req.is_restartable());
        assert!(req.try_clone().is_none());

        req.buffer_body().await.unwrap();
        assert!(req.is_restartable());

        let copy = req.try_clone().unwrap();
        assert_eq!(copy.method(), HttpMethod::Post);
        assert_eq!(copy.body().content_length(), Some(3));
    }

    #[test]
    fn test_clone_is_independent() {
        let req = request().with_header("Accept", "text/plain");
        let mut copy = req.try_clone().unwrap();
        copy.headers_mut().set("Accept", "application/json");

        assert_eq!(req.headers().value("accept"), Some("text/plain"));
    }

    #[test]
    fn test_parse_rejects_relative_url() {
        assert!(HttpRequest::parse(HttpMethod::Get, "/relative").is_err());
    }
}
