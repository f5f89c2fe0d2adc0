//! Request and response value objects.
//!
//! These are plain data holders; the pipeline only relies on the request
//! being clonable for retries and on headers comparing case-insensitively.

mod body;
mod headers;
mod method;
mod request;
mod response;

pub use body::Body;
pub use headers::{HttpHeader, HttpHeaders};
pub use method::HttpMethod;
pub use request::HttpRequest;
pub use response::HttpResponse;

/// Common content type values.
pub mod content_type {
    /// `application/json`
    pub const APPLICATION_JSON: &str = "application/json";
    /// `application/octet-stream`
    pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
}
