//! WSGI-shaped gateway
//!
//! The application is a blocking callable run on the blocking pool. It gets
//! a CGI-style environ plus a `start_response` handle and returns an iterator
//! of body chunks; `start_response` may be called any time before the first
//! chunk is yielded.

use crate::body::{self, BodySender, HttpBody};
use crate::Gateway;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use parking_lot::Mutex;
use percent_encoding::percent_decode;
use statik_core::config::GatewayKind;
use statik_core::server::StaticRequest;
use statik_files::{Disconnected, Dispatch, GatewayRequest, ResponseSink, StaticFiles};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Response body iterator
pub type Body = Box<dyn Iterator<Item = Bytes> + Send>;

/// CGI-style request variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environ {
    vars: BTreeMap<String, String>,
}

impl Environ {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let uri = request.uri();
        let raw_uri = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());

        let mut environ = Self::default();
        environ.set("REQUEST_METHOD", request.method().as_str());
        environ.set("SCRIPT_NAME", "");
        environ.set(
            "PATH_INFO",
            percent_decode(uri.path().as_bytes()).decode_utf8_lossy(),
        );
        environ.set("QUERY_STRING", uri.query().unwrap_or(""));
        environ.set("REQUEST_URI", raw_uri);
        environ.set("RAW_URI", raw_uri);
        environ.set(
            "SERVER_PROTOCOL",
            format!("HTTP/{}", crate::asgi::http_version(request.version())),
        );
        environ.set("wsgi.url_scheme", "http");

        for (name, value) in request.headers() {
            let key = match name.as_str() {
                "content-type" => "CONTENT_TYPE".to_string(),
                "content-length" => "CONTENT_LENGTH".to_string(),
                other => format!("HTTP_{}", other.to_ascii_uppercase().replace('-', "_")),
            };
            let value = String::from_utf8_lossy(value.as_bytes());
            match environ.vars.get_mut(&key) {
                Some(existing) => {
                    existing.push(',');
                    existing.push_str(&value);
                }
                None => environ.set(key, value),
            }
        }
        environ
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl GatewayRequest for Environ {
    /// Built from `REQUEST_URI`, not `PATH_INFO`, so the engine decodes the
    /// path exactly once
    fn to_static_request(&self) -> Option<StaticRequest> {
        let method = Method::from_bytes(self.get("REQUEST_METHOD")?.as_bytes()).ok()?;
        let mut request = StaticRequest::new(method, self.get("REQUEST_URI")?);
        for (key, value) in self.iter() {
            let name = match key {
                "CONTENT_TYPE" => "content-type".to_string(),
                "CONTENT_LENGTH" => "content-length".to_string(),
                _ => match key.strip_prefix("HTTP_") {
                    Some(name) => name.to_ascii_lowercase().replace('_', "-"),
                    None => continue,
                },
            };
            request = request.header(&name, value);
        }
        Some(request)
    }
}

#[derive(Debug, Error)]
pub enum WsgiError {
    #[error("invalid status line {0:?}")]
    InvalidStatus(String),

    #[error("start_response already called")]
    AlreadyStarted,

    #[error(transparent)]
    Disconnected(#[from] Disconnected),
}

struct Head {
    status: StatusCode,
    headers: HeaderMap,
}

/// The `start_response` callable; clones share one response
#[derive(Clone)]
pub struct StartResponse {
    head: Arc<Mutex<Option<oneshot::Sender<Head>>>>,
}

impl StartResponse {
    fn new(tx: oneshot::Sender<Head>) -> Self {
        Self {
            head: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// `status` is a status line such as `"200 OK"`
    pub fn call(&self, status: &str, headers: Vec<(String, String)>) -> Result<(), WsgiError> {
        let code = status
            .split_whitespace()
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or_else(|| WsgiError::InvalidStatus(status.to_string()))?;

        let tx = self.head.lock().take().ok_or(WsgiError::AlreadyStarted)?;
        tx.send(Head {
            status: code,
            headers: body::header_map(headers),
        })
        .map_err(|_| WsgiError::Disconnected(Disconnected))
    }
}

/// Status line for `status`, e.g. `"404 Not Found"`
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// WSGI application; called on a blocking thread
pub trait Application: Send + Sync + 'static {
    fn call(&self, environ: &Environ, start_response: StartResponse) -> Body;
}

/// Writes engine responses through `start_response` and the body channel
struct WsgiSink {
    start_response: StartResponse,
    sender: Option<BodySender>,
}

#[async_trait]
impl ResponseSink for WsgiSink {
    async fn start(&mut self, status: StatusCode, headers: &HeaderMap) -> Result<(), Disconnected> {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        self.start_response
            .call(&status_line(status), headers)
            .map_err(|_| Disconnected)
    }

    async fn send(&mut self, chunk: Bytes) -> Result<(), Disconnected> {
        match &self.sender {
            Some(sender) => sender.send(chunk).await,
            None => Err(Disconnected),
        }
    }

    async fn finish(&mut self) -> Result<(), Disconnected> {
        self.sender = None;
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.abort();
        }
    }
}

fn run_application(app: &dyn Application, environ: &Environ, start_response: StartResponse, sender: BodySender) {
    for chunk in app.call(environ, start_response) {
        if chunk.is_empty() {
            continue;
        }
        if sender.blocking_send(chunk).is_err() {
            tracing::debug!("Client disconnected, closing WSGI body iterator");
            return;
        }
    }
}

/// Serves mounts first and hands everything else to a WSGI application
pub struct WsgiGateway {
    files: Arc<StaticFiles>,
    app: Arc<dyn Application>,
}

impl WsgiGateway {
    pub fn new(files: Arc<StaticFiles>, app: Arc<dyn Application>) -> Self {
        Self { files, app }
    }
}

#[async_trait]
impl Gateway for WsgiGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Wsgi
    }

    async fn handle(&self, request: Request<()>) -> Response<HttpBody> {
        let environ = Environ::from_request(&request);
        let (head_tx, head_rx) = oneshot::channel();
        let (sender, body) = body::body_channel();
        let files = self.files.clone();
        let app = self.app.clone();

        tokio::spawn(async move {
            let mut sink = WsgiSink {
                start_response: StartResponse::new(head_tx),
                sender: Some(sender),
            };
            if files.serve(&environ, &mut sink).await != Dispatch::Passthrough {
                return;
            }

            let WsgiSink { start_response, sender } = sink;
            let Some(sender) = sender else {
                return;
            };
            let result = tokio::task::spawn_blocking(move || {
                run_application(app.as_ref(), &environ, start_response, sender)
            })
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "❌ WSGI application panicked");
            }
        });

        match head_rx.await {
            Ok(head) => body::response(head.status, head.headers, body),
            Err(_) => {
                tracing::error!("❌ WSGI application returned without calling start_response");
                body::error(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
