//! Capability interface between the engine and a gateway shape
//!
//! A gateway provides two things: a way to read its native request into a
//! [`StaticRequest`], and a [`ResponseSink`] that writes status, headers and
//! body chunks in its native form. The engine never sees anything else.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use statik_core::server::StaticRequest;
use thiserror::Error;

/// The peer stopped consuming the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client disconnected")]
pub struct Disconnected;

/// Native request that can be reduced to the generic model
pub trait GatewayRequest {
    /// `None` when the native request has no generic form (for example an
    /// unparsable method); such requests are left to the application.
    fn to_static_request(&self) -> Option<StaticRequest>;
}

impl GatewayRequest for StaticRequest {
    fn to_static_request(&self) -> Option<StaticRequest> {
        Some(self.clone())
    }
}

/// Writes one response in a gateway's native shape.
///
/// Calls arrive in order: `start` once, `send` zero or more times, then
/// either `finish` or `abort`. After an error no further calls are made.
#[async_trait]
pub trait ResponseSink: Send {
    /// Commit the status line and headers
    async fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<(), Disconnected>;

    /// Write one body chunk
    async fn send(&mut self, chunk: Bytes) -> Result<(), Disconnected>;

    /// Mark the body complete
    async fn finish(&mut self) -> Result<(), Disconnected>;

    /// Tear the response down without completing it, so the peer sees a
    /// truncated message instead of a short but well-formed one
    fn abort(&mut self);
}
