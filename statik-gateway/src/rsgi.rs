//! RSGI-shaped gateway
//!
//! The application is called with a scope and a protocol object and answers
//! through exactly one of `response_empty`, `response_bytes`, `response_str`
//! or `response_stream`. The streaming form hands back a [`Transport`] that
//! writes the body; dropping it ends the response.

use crate::body::{self, BodySender, HttpBody};
use crate::Gateway;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use statik_core::config::GatewayKind;
use statik_core::server::StaticRequest;
use statik_files::{Disconnected, Dispatch, GatewayRequest, ResponseSink, StaticFiles};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Response headers in their native form
pub type ResponseHeaders = Vec<(String, String)>;

/// HTTP request scope
#[derive(Debug, Clone)]
pub struct Scope {
    pub proto: &'static str,
    pub http_version: &'static str,
    pub scheme: &'static str,
    pub method: String,
    /// Path as received, still percent-encoded
    pub path: String,
    pub query_string: String,
    pub headers: HeaderMap,
}

impl Scope {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            proto: "http",
            http_version: crate::asgi::http_version(request.version()),
            scheme: "http",
            method: request.method().as_str().to_string(),
            path: request.uri().path().to_string(),
            query_string: request.uri().query().unwrap_or("").to_string(),
            headers: request.headers().clone(),
        }
    }
}

impl GatewayRequest for Scope {
    fn to_static_request(&self) -> Option<StaticRequest> {
        let method = Method::from_bytes(self.method.as_bytes()).ok()?;
        let mut request = StaticRequest::new(method, self.path.as_str());
        request.headers = self.headers.clone();
        Some(request)
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("a response was already sent")]
    AlreadyResponded,

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error(transparent)]
    Disconnected(#[from] Disconnected),
}

/// Protocol object handed to the application
pub struct HttpProtocol {
    reply: Option<oneshot::Sender<Response<HttpBody>>>,
}

impl HttpProtocol {
    fn respond(&mut self, status: u16, headers: ResponseHeaders, body: HttpBody) -> Result<(), ProtocolError> {
        let status = StatusCode::from_u16(status).map_err(|_| ProtocolError::InvalidStatus(status))?;
        let reply = self.reply.take().ok_or(ProtocolError::AlreadyResponded)?;
        reply
            .send(body::response(status, body::header_map(headers), body))
            .map_err(|_| ProtocolError::Disconnected(Disconnected))
    }

    pub fn response_empty(&mut self, status: u16, headers: ResponseHeaders) -> Result<(), ProtocolError> {
        self.respond(status, headers, body::empty())
    }

    pub fn response_bytes(
        &mut self,
        status: u16,
        headers: ResponseHeaders,
        body: impl Into<Bytes>,
    ) -> Result<(), ProtocolError> {
        self.respond(status, headers, body::full(body))
    }

    pub fn response_str(
        &mut self,
        status: u16,
        headers: ResponseHeaders,
        body: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        self.respond(status, headers, body::full(body.into()))
    }

    /// Send the head now and stream the body through the returned transport
    pub fn response_stream(&mut self, status: u16, headers: ResponseHeaders) -> Result<Transport, ProtocolError> {
        let (sender, body) = body::body_channel();
        self.respond(status, headers, body)?;
        Ok(Transport { sender })
    }
}

/// Body writer returned by `response_stream`
#[derive(Debug)]
pub struct Transport {
    sender: BodySender,
}

impl Transport {
    pub async fn send_bytes(&self, data: impl Into<Bytes>) -> Result<(), Disconnected> {
        self.sender.send(data.into()).await
    }

    pub async fn send_str(&self, data: &str) -> Result<(), Disconnected> {
        self.sender.send(Bytes::copy_from_slice(data.as_bytes())).await
    }

    /// End the response as failed rather than complete
    pub fn abort(self) {
        self.sender.abort();
    }
}

/// RSGI application
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn call(&self, scope: Scope, protocol: HttpProtocol) -> Result<(), ProtocolError>;
}

fn native_headers(headers: &HeaderMap) -> ResponseHeaders {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Writes engine responses through the protocol object. The head is held
/// back until the body shape is known: an empty body goes out through
/// `response_empty`, anything else through `response_stream`.
struct RsgiSink {
    protocol: HttpProtocol,
    pending: Option<(StatusCode, ResponseHeaders)>,
    transport: Option<Transport>,
}

impl RsgiSink {
    fn new(protocol: HttpProtocol) -> Self {
        Self {
            protocol,
            pending: None,
            transport: None,
        }
    }
}

#[async_trait]
impl ResponseSink for RsgiSink {
    async fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<(), Disconnected> {
        self.pending = Some((status, native_headers(headers)));
        Ok(())
    }

    async fn send(&mut self, chunk: Bytes) -> Result<(), Disconnected> {
        if self.transport.is_none() {
            let (status, headers) = self.pending.take().ok_or(Disconnected)?;
            let transport = self
                .protocol
                .response_stream(status.as_u16(), headers)
                .map_err(|_| Disconnected)?;
            self.transport = Some(transport);
        }
        match &self.transport {
            Some(transport) => transport.send_bytes(chunk).await,
            None => Err(Disconnected),
        }
    }

    async fn finish(&mut self) -> Result<(), Disconnected> {
        if self.transport.take().is_some() {
            return Ok(());
        }
        let (status, headers) = self.pending.take().ok_or(Disconnected)?;
        self.protocol
            .response_empty(status.as_u16(), headers)
            .map_err(|_| Disconnected)
    }

    fn abort(&mut self) {
        self.pending = None;
        if let Some(transport) = self.transport.take() {
            transport.abort();
        }
    }
}

/// Serves mounts first and hands everything else to an RSGI application
pub struct RsgiGateway {
    files: Arc<StaticFiles>,
    app: Arc<dyn Application>,
}

impl RsgiGateway {
    pub fn new(files: Arc<StaticFiles>, app: Arc<dyn Application>) -> Self {
        Self { files, app }
    }
}

#[async_trait]
impl Gateway for RsgiGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Rsgi
    }

    async fn handle(&self, request: Request<()>) -> Response<HttpBody> {
        let scope = Scope::from_request(&request);
        let (tx, rx) = oneshot::channel();
        let files = self.files.clone();
        let app = self.app.clone();

        tokio::spawn(async move {
            let mut sink = RsgiSink::new(HttpProtocol { reply: Some(tx) });
            if files.serve(&scope, &mut sink).await != Dispatch::Passthrough {
                return;
            }
            if let Err(e) = app.call(scope, sink.protocol).await {
                tracing::debug!(error = %e, "RSGI application failed to respond");
            }
        });

        match rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!("❌ RSGI application finished without a response");
                body::error(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
