//! Generic response model

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::pin::Pin;

/// Lazy, finite, single-pass body
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Response body source
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    Stream(BodyStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Full(bytes) => write!(f, "Full({} bytes)", bytes.len()),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Status, headers and body produced by the static file engine
#[derive(Debug)]
pub struct StaticResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl StaticResponse {
    /// Create a simple response with status code and no body
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
        }
    }

    /// Create a plain-text response with a fixed body
    pub fn with_body(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        Self {
            status,
            headers,
            body: ResponseBody::Full(body),
        }
    }

    /// Add a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn not_found() -> Self {
        Self::with_body(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn method_not_allowed() -> Self {
        Self::with_body(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
            .header(http::header::ALLOW, HeaderValue::from_static("GET, HEAD"))
    }

    pub fn internal_error() -> Self {
        Self::with_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    /// Drop the body but keep every header, for HEAD requests
    pub fn without_body(mut self) -> Self {
        self.body = ResponseBody::Empty;
        self
    }
}
