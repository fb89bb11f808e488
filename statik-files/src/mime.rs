//! MIME type handling

use std::path::Path;

/// Fallback for extensions the table does not know
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Get MIME type for a file from its extension
pub fn guess_mime_type(path: impl AsRef<Path>) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
}
