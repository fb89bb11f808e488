//! Per-request error taxonomy

use http::StatusCode;
use thiserror::Error;

/// Failure while serving a request from a mount
///
/// Missing files, directories, traversal attempts and permission problems
/// all collapse into `NotFound` so that probing the filesystem reveals
/// nothing beyond "not served".
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    /// Resolution succeeded but reading the file failed
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound => StatusCode::NOT_FOUND,
            ServeError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ServeResult<T> = std::result::Result<T, ServeError>;
