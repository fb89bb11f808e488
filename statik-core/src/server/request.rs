//! Generic request model
//!
//! Every gateway adapter reduces its native request to this shape before
//! handing it to the static file engine.

use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// Method, path and headers of an inbound request
#[derive(Debug, Clone)]
pub struct StaticRequest {
    pub method: Method,
    /// Raw (still percent-encoded) path, without query string
    pub path: String,
    pub headers: HeaderMap,
}

impl StaticRequest {
    /// Create a request; anything after `?` in `path` is dropped
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if let Some(idx) = path.find('?') {
            path.truncate(idx);
        }
        Self {
            method,
            path,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header, ignoring names or values that are not valid HTTP
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// All Accept-Encoding values joined into one list, `None` when absent
    pub fn accept_encoding(&self) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(http::header::ACCEPT_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }
}
