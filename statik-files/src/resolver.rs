//! Path resolution against a mount root
//!
//! A raw request path is percent-decoded once, split into segments and
//! normalized lexically; a `..` that would climb above the mount root is a
//! miss. The surviving segments are joined onto the root and the result is
//! canonicalized, so symlinks are followed before the containment check.
//! Every failure is reported as `NotFound`.

use crate::cache::{FileEntry, MetadataCache};
use crate::error::{ServeError, ServeResult};
use percent_encoding::percent_decode_str;
use statik_core::server::Mount;
use std::path::PathBuf;
use std::sync::Arc;

/// Lexically normalize a mount-relative request path.
///
/// Returns `None` for paths that climb above the root, do not decode to
/// UTF-8, or contain bytes that are never valid in a served name.
pub fn normalize(raw_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(raw_path).decode_utf8().ok()?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => {
                if !is_valid_segment(s) {
                    return None;
                }
                segments.push(s);
            }
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.iter().collect())
}

fn is_valid_segment(segment: &str) -> bool {
    if segment.contains('\0') || segment.contains('\\') {
        return false;
    }
    // Drive letters and stream names would escape `join` on Windows
    if cfg!(windows) && segment.contains(':') {
        return false;
    }
    true
}

/// Resolve `raw_path` under `mount` to a cached regular-file entry
pub async fn resolve(mount: &Mount, raw_path: &str, cache: &MetadataCache) -> ServeResult<Arc<FileEntry>> {
    let Some(relative) = normalize(raw_path) else {
        tracing::warn!(mount = %mount.prefix(), path = %raw_path, "Rejected request path");
        return Err(ServeError::NotFound);
    };

    let joined = mount.root().join(&relative);
    let canonical = match tokio::fs::canonicalize(&joined).await {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(path = %joined.display(), error = %e, "No such file");
            return Err(ServeError::NotFound);
        }
    };

    if !canonical.starts_with(mount.root()) {
        tracing::warn!(
            mount = %mount.prefix(),
            path = %raw_path,
            target = %canonical.display(),
            "Resolved path escapes mount root"
        );
        return Err(ServeError::NotFound);
    }

    match tokio::fs::metadata(&canonical).await {
        Ok(metadata) if metadata.is_file() => {}
        _ => return Err(ServeError::NotFound),
    }

    cache
        .get_or_populate(&canonical, mount.root())
        .await
        .map_err(|e| {
            tracing::debug!(path = %canonical.display(), error = %e, "Metadata population failed");
            ServeError::NotFound
        })
}
