//! Response headers for a negotiated file

use crate::cache::FileEntry;
use crate::negotiate::NegotiationResult;
use http::header::{
    CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED, VARY,
};
use http::{HeaderValue, StatusCode};
use statik_core::server::StaticResponse;

/// Build the `200` response head for `negotiation`; the body is attached
/// by the caller.
///
/// `Content-Type` and `Last-Modified` describe the logical asset, while
/// `Content-Length` is the size of the selected representation.
pub fn build(entry: &FileEntry, negotiation: &NegotiationResult<'_>, cache_control: &HeaderValue) -> StaticResponse {
    let mut response = StaticResponse::status(StatusCode::OK);
    let headers = &mut response.headers;

    headers.insert(CONTENT_TYPE, HeaderValue::from_static(entry.mime_type));
    if let Some(encoding) = negotiation.content_encoding {
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }
    headers.insert(CACHE_CONTROL, cache_control.clone());
    headers.insert(CONTENT_LENGTH, HeaderValue::from(negotiation.variant.size));

    if let Some(modified) = entry.last_modified {
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
            headers.insert(LAST_MODIFIED, value);
        }
    }
    if entry.has_encoded_variants() {
        headers.insert(VARY, HeaderValue::from_static("accept-encoding"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use crate::negotiate::negotiate;
    use statik_core::config::{Encoding, PrecompressedConfig};

    #[tokio::test]
    async fn test_headers_for_encoded_variant() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("app.js"), vec![b'a'; 140]).unwrap();
        std::fs::write(root.join("app.js.br"), vec![b'b'; 70]).unwrap();
        let cache = MetadataCache::new(vec![PrecompressedConfig::new(Encoding::Brotli, ".br")]);
        let entry = cache.get_or_populate(&root.join("app.js"), &root).await.unwrap();
        let policy = HeaderValue::from_static("max-age=60");

        let response = build(&entry, &negotiate(&entry, Some("br")), &policy);
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[CONTENT_TYPE], "text/javascript");
        assert_eq!(response.headers[CONTENT_ENCODING], "br");
        assert_eq!(response.headers[CONTENT_LENGTH], "70");
        assert_eq!(response.headers[CACHE_CONTROL], "max-age=60");
        assert_eq!(response.headers[VARY], "accept-encoding");
        assert!(response.headers.contains_key(LAST_MODIFIED));

        let response = build(&entry, &negotiate(&entry, None), &policy);
        assert!(!response.headers.contains_key(CONTENT_ENCODING));
        assert_eq!(response.headers[CONTENT_LENGTH], "140");
        assert_eq!(response.headers[VARY], "accept-encoding");
    }

    #[tokio::test]
    async fn test_no_vary_without_variants() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("blob.unknownext"), "data").unwrap();
        let cache = MetadataCache::new(Vec::new());
        let entry = cache.get_or_populate(&root.join("blob.unknownext"), &root).await.unwrap();

        let response = build(&entry, &negotiate(&entry, Some("gzip")), &HeaderValue::from_static("no-cache"));
        assert_eq!(response.headers[CONTENT_TYPE], "application/octet-stream");
        assert!(!response.headers.contains_key(VARY));
    }
}
