//! ASGI-shaped gateway
//!
//! The application is called with a connection scope and a `send` handle
//! that accepts `http.response.start` followed by `http.response.body`
//! messages; the last body message carries `more_body = false`. A channel
//! that closes before that message means the response was aborted.

use crate::body::{self, HttpBody};
use crate::Gateway;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode;
use statik_core::config::GatewayKind;
use statik_core::server::StaticRequest;
use statik_files::{Disconnected, Dispatch, GatewayRequest, ResponseSink, StaticFiles};
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

const MESSAGE_DEPTH: usize = 8;

/// HTTP connection scope
#[derive(Debug, Clone)]
pub struct Scope {
    pub http_version: &'static str,
    pub method: String,
    pub scheme: &'static str,
    /// Percent-decoded path
    pub path: String,
    /// Path exactly as received
    pub raw_path: Bytes,
    pub query_string: Bytes,
    /// Lowercased header names with their values, in request order
    pub headers: Vec<(Bytes, Bytes)>,
}

impl Scope {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let raw_path = request.uri().path();
        Self {
            http_version: http_version(request.version()),
            method: request.method().as_str().to_string(),
            scheme: "http",
            path: percent_decode(raw_path.as_bytes()).decode_utf8_lossy().into_owned(),
            raw_path: Bytes::copy_from_slice(raw_path.as_bytes()),
            query_string: Bytes::copy_from_slice(request.uri().query().unwrap_or("").as_bytes()),
            headers: request
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        Bytes::copy_from_slice(name.as_str().as_bytes()),
                        Bytes::copy_from_slice(value.as_bytes()),
                    )
                })
                .collect(),
        }
    }

    /// First value of header `name` (lowercase)
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_ref() == name.as_bytes())
            .map(|(_, v)| v.as_ref())
    }
}

impl GatewayRequest for Scope {
    fn to_static_request(&self) -> Option<StaticRequest> {
        let method = Method::from_bytes(self.method.as_bytes()).ok()?;
        let path = std::str::from_utf8(&self.raw_path).ok()?;
        let mut request = StaticRequest::new(method, path);
        request.headers = body::header_map(self.headers.iter().map(|(n, v)| (n, v)));
        Some(request)
    }
}

pub(crate) fn http_version(version: http::Version) -> &'static str {
    match version {
        http::Version::HTTP_09 => "0.9",
        http::Version::HTTP_10 => "1.0",
        http::Version::HTTP_2 => "2",
        http::Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

/// Events sent by the application
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `http.response.start`
    ResponseStart { status: u16, headers: Vec<(Bytes, Bytes)> },
    /// `http.response.body`
    ResponseBody { body: Bytes, more_body: bool },
}

impl Message {
    pub fn start(status: StatusCode, headers: &HeaderMap) -> Self {
        Message::ResponseStart {
            status: status.as_u16(),
            headers: headers
                .iter()
                .map(|(name, value)| {
                    (
                        Bytes::copy_from_slice(name.as_str().as_bytes()),
                        Bytes::copy_from_slice(value.as_bytes()),
                    )
                })
                .collect(),
        }
    }

    pub fn body(body: impl Into<Bytes>, more_body: bool) -> Self {
        Message::ResponseBody {
            body: body.into(),
            more_body,
        }
    }
}

/// The `send` callable
#[derive(Debug, Clone)]
pub struct Sender {
    tx: mpsc::Sender<Message>,
}

impl Sender {
    pub async fn send(&self, message: Message) -> Result<(), Disconnected> {
        self.tx.send(message).await.map_err(|_| Disconnected)
    }
}

/// ASGI application
#[async_trait]
pub trait Application: Send + Sync + 'static {
    async fn call(&self, scope: Scope, send: Sender) -> Result<(), Disconnected>;
}

/// Writes engine responses as ASGI messages
struct AsgiSink {
    send: Option<Sender>,
}

impl AsgiSink {
    async fn emit(&mut self, message: Message) -> Result<(), Disconnected> {
        match &self.send {
            Some(send) => send.send(message).await,
            None => Err(Disconnected),
        }
    }
}

#[async_trait]
impl ResponseSink for AsgiSink {
    async fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<(), Disconnected> {
        self.emit(Message::start(status, headers)).await
    }

    async fn send(&mut self, chunk: Bytes) -> Result<(), Disconnected> {
        self.emit(Message::body(chunk, true)).await
    }

    async fn finish(&mut self) -> Result<(), Disconnected> {
        self.emit(Message::body(Bytes::new(), false)).await?;
        self.send = None;
        Ok(())
    }

    fn abort(&mut self) {
        self.send = None;
    }
}

/// Serves mounts first and hands everything else to an ASGI application
pub struct AsgiGateway {
    files: Arc<StaticFiles>,
    app: Arc<dyn Application>,
}

impl AsgiGateway {
    pub fn new(files: Arc<StaticFiles>, app: Arc<dyn Application>) -> Self {
        Self { files, app }
    }
}

#[async_trait]
impl Gateway for AsgiGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Asgi
    }

    async fn handle(&self, request: Request<()>) -> Response<HttpBody> {
        let scope = Scope::from_request(&request);
        let (tx, mut rx) = mpsc::channel(MESSAGE_DEPTH);
        let files = self.files.clone();
        let app = self.app.clone();

        tokio::spawn(async move {
            let mut sink = AsgiSink {
                send: Some(Sender { tx }),
            };
            if files.serve(&scope, &mut sink).await != Dispatch::Passthrough {
                return;
            }
            if let Some(send) = sink.send.take() {
                if let Err(e) = app.call(scope, send).await {
                    tracing::debug!(error = %e, "ASGI application stopped sending");
                }
            }
        });

        let (status, headers) = match rx.recv().await {
            Some(Message::ResponseStart { status, headers }) => (status, headers),
            Some(Message::ResponseBody { .. }) => {
                tracing::error!("❌ ASGI body message before http.response.start");
                return body::error(StatusCode::INTERNAL_SERVER_ERROR);
            }
            None => {
                tracing::error!("❌ ASGI application finished without a response");
                return body::error(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        let Ok(status) = StatusCode::from_u16(status) else {
            tracing::error!(status, "❌ ASGI application sent an invalid status");
            return body::error(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let chunks = futures::stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            match rx.recv().await {
                Some(Message::ResponseBody { body, more_body }) => Some((Ok(body), more_body.then_some(rx))),
                Some(Message::ResponseStart { .. }) => Some((
                    Err(io::Error::other("duplicate http.response.start")),
                    None,
                )),
                None => Some((
                    Err(io::Error::new(io::ErrorKind::ConnectionAborted, "response aborted")),
                    None,
                )),
            }
        });

        body::response(status, body::header_map(headers), body::from_stream(chunks))
    }
}
