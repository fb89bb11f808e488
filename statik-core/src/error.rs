//! Error types for Statik

use thiserror::Error;

/// Result type for Statik operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Statik
///
/// These are construction-time and process-level failures. Per-request
/// failures never surface here; they are turned into status codes by the
/// static file engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Overlapping or invalid mount definition
    #[error("Misconfigured mount: {0}")]
    MisconfiguredMount(String),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
