//! Content negotiation over precompressed variants
//!
//! The server's priority order (the order variants were configured in)
//! decides between acceptable encodings; the order and weights of codings
//! in the request only decide *whether* a coding is acceptable.

use crate::cache::{FileEntry, Variant};
use statik_core::config::Encoding;
use std::collections::HashSet;

/// Parsed `Accept-Encoding` header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptEncoding {
    accepted: HashSet<Encoding>,
    rejected: HashSet<Encoding>,
    /// `Some(true)` for `*`, `Some(false)` for `*;q=0`
    wildcard: Option<bool>,
}

impl AcceptEncoding {
    /// Parse a header value; `None` or empty accepts identity only
    pub fn parse(header: Option<&str>) -> Self {
        let mut parsed = Self::default();
        let Some(header) = header else {
            return parsed;
        };

        for item in header.split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or("").trim();
            if coding.is_empty() {
                continue;
            }

            let allowed = parts
                .filter_map(|param| {
                    let (name, value) = param.split_once('=')?;
                    name.trim().eq_ignore_ascii_case("q").then(|| value.trim())
                })
                .last()
                .map(weight_allows)
                .unwrap_or(true);

            if coding == "*" {
                parsed.wildcard = Some(allowed);
            } else if let Some(encoding) = Encoding::from_token(coding) {
                if allowed {
                    parsed.accepted.insert(encoding);
                } else {
                    parsed.rejected.insert(encoding);
                }
            }
        }
        parsed
    }

    /// Whether the client accepts `encoding`. Identity is always acceptable.
    pub fn accepts(&self, encoding: Encoding) -> bool {
        if encoding == Encoding::Identity {
            return true;
        }
        if self.rejected.contains(&encoding) {
            return false;
        }
        self.accepted.contains(&encoding) || self.wildcard.unwrap_or(false)
    }
}

/// The representation chosen for a response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegotiationResult<'a> {
    pub encoding: Encoding,
    /// Value for `Content-Encoding`; absent for identity
    pub content_encoding: Option<&'static str>,
    pub variant: &'a Variant,
}

/// Pick the best variant of `entry` the client accepts
pub fn negotiate<'a>(entry: &'a FileEntry, accept_encoding: Option<&str>) -> NegotiationResult<'a> {
    let accept = AcceptEncoding::parse(accept_encoding);

    let variant = entry
        .encoded()
        .iter()
        .find(|variant| accept.accepts(variant.encoding))
        .unwrap_or_else(|| entry.identity());

    NegotiationResult {
        encoding: variant.encoding,
        content_encoding: match variant.encoding {
            Encoding::Identity => None,
            other => Some(other.token()),
        },
        variant,
    }
}

/// A weight outside 0..=1, or one that is not a number, counts as q=1
fn weight_allows(q: &str) -> bool {
    match q.parse::<f32>() {
        Ok(q) if (0.0..=1.0).contains(&q) => q > 0.0,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use statik_core::config::PrecompressedConfig;
    use std::sync::Arc;

    async fn script_entry(dir: &tempfile::TempDir) -> Arc<FileEntry> {
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("script.js"), vec![b'i'; 140]).unwrap();
        std::fs::write(root.join("script.js.gz"), vec![b'g'; 110]).unwrap();
        std::fs::write(root.join("script.js.zst"), vec![b'z'; 91]).unwrap();
        std::fs::write(root.join("script.js.br"), vec![b'b'; 70]).unwrap();

        let cache = MetadataCache::new(vec![
            PrecompressedConfig::new(Encoding::Brotli, ".br"),
            PrecompressedConfig::new(Encoding::Zstd, ".zst"),
            PrecompressedConfig::new(Encoding::Gzip, ".gz"),
        ]);
        cache.get_or_populate(&root.join("script.js"), &root).await.unwrap()
    }

    #[test]
    fn test_parse_basic() {
        let accept = AcceptEncoding::parse(Some("gzip, br;q=0.5"));
        assert!(accept.accepts(Encoding::Gzip));
        assert!(accept.accepts(Encoding::Brotli));
        assert!(!accept.accepts(Encoding::Zstd));
        assert!(accept.accepts(Encoding::Identity));
    }

    #[test]
    fn test_parse_zero_weight_excludes() {
        let accept = AcceptEncoding::parse(Some("gzip;q=0, br;q=0.000, zstd; Q=0.1"));
        assert!(!accept.accepts(Encoding::Gzip));
        assert!(!accept.accepts(Encoding::Brotli));
        assert!(accept.accepts(Encoding::Zstd));
    }

    #[test]
    fn test_parse_wildcard() {
        let accept = AcceptEncoding::parse(Some("*, gzip;q=0"));
        assert!(accept.accepts(Encoding::Brotli));
        assert!(!accept.accepts(Encoding::Gzip));

        let accept = AcceptEncoding::parse(Some("br, *;q=0"));
        assert!(accept.accepts(Encoding::Brotli));
        assert!(!accept.accepts(Encoding::Zstd));
    }

    #[test]
    fn test_parse_absent_or_garbage() {
        for header in [None, Some(""), Some(" , ;"), Some("compress, deflate")] {
            let accept = AcceptEncoding::parse(header);
            assert!(!accept.accepts(Encoding::Gzip));
            assert!(accept.accepts(Encoding::Identity));
        }
    }

    #[test]
    fn test_identity_always_acceptable() {
        let accept = AcceptEncoding::parse(Some("identity;q=0, *;q=0"));
        assert!(accept.accepts(Encoding::Identity));
    }

    #[test]
    fn test_malformed_weight_counts_as_accepted() {
        let accept = AcceptEncoding::parse(Some("gzip;q=abc, X-GZIP"));
        assert!(accept.accepts(Encoding::Gzip));

        for weight in ["NaN", "nan", "inf", "-1", "2.5", ""] {
            let header = format!("br;q={weight}");
            let accept = AcceptEncoding::parse(Some(&header));
            assert!(accept.accepts(Encoding::Brotli), "q={weight}");
        }

        let accept = AcceptEncoding::parse(Some("br;q=0.0, zstd;q=0.001"));
        assert!(!accept.accepts(Encoding::Brotli));
        assert!(accept.accepts(Encoding::Zstd));
    }

    #[tokio::test]
    async fn test_negotiation_table() {
        let dir = tempfile::tempdir().unwrap();
        let entry = script_entry(&dir).await;

        let cases = [
            (Some("identity"), None, 140),
            (Some("gzip"), Some("gzip"), 110),
            (Some("gzip, zstd"), Some("zstd"), 91),
            (Some("gzip, zstd, br"), Some("br"), 70),
            (None, None, 140),
        ];
        for (header, content_encoding, size) in cases {
            let result = negotiate(&entry, header);
            assert_eq!(result.content_encoding, content_encoding, "{header:?}");
            assert_eq!(result.variant.size, size, "{header:?}");
        }
    }

    #[tokio::test]
    async fn test_server_priority_beats_client_order() {
        let dir = tempfile::tempdir().unwrap();
        let entry = script_entry(&dir).await;

        let result = negotiate(&entry, Some("gzip;q=1.0, br;q=0.1"));
        assert_eq!(result.encoding, Encoding::Brotli);
    }

    #[tokio::test]
    async fn test_falls_back_to_identity_when_variant_missing() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("plain.css"), "a{}").unwrap();
        let cache = MetadataCache::new(vec![PrecompressedConfig::new(Encoding::Brotli, ".br")]);
        let entry = cache.get_or_populate(&root.join("plain.css"), &root).await.unwrap();

        let result = negotiate(&entry, Some("br, gzip"));
        assert_eq!(result.encoding, Encoding::Identity);
        assert_eq!(result.content_encoding, None);
        assert_eq!(result.variant.path, root.join("plain.css"));
    }
}
