//! Application behind the mounts
//!
//! `InfoApp` answers `/info` with a JSON description of the running server
//! and `404` for everything else, under any of the three gateway shapes.

use crate::{asgi, rsgi, wsgi};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use statik_core::config::{GatewayKind, RuntimeMode};
use statik_files::Disconnected;

#[derive(Debug, Serialize)]
struct Info<'a> {
    server: &'a str,
    version: &'a str,
    gateway: GatewayKind,
    mode: RuntimeMode,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// Minimal fallback application
#[derive(Debug, Clone, Copy)]
pub struct InfoApp {
    mode: RuntimeMode,
}

impl InfoApp {
    pub fn new(mode: RuntimeMode) -> Self {
        Self { mode }
    }

    fn route(&self, gateway: GatewayKind, method: &str, path: &str) -> Reply {
        if path != "/info" {
            return reply(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "Not Found");
        }
        if method != "GET" && method != "HEAD" {
            return reply(
                StatusCode::METHOD_NOT_ALLOWED,
                "text/plain; charset=utf-8",
                "Method Not Allowed",
            );
        }

        let info = Info {
            server: "statik",
            version: statik_core::VERSION,
            gateway,
            mode: self.mode,
        };
        match serde_json::to_vec(&info) {
            Ok(json) => reply(StatusCode::OK, "application/json", json),
            Err(e) => {
                tracing::error!(error = %e, "❌ Failed to encode info response");
                reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    "Internal Server Error",
                )
            }
        }
    }
}

fn reply(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Reply {
    let body = body.into();
    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    Reply { status, headers, body }
}

fn native_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect()
}

#[async_trait]
impl asgi::Application for InfoApp {
    async fn call(&self, scope: asgi::Scope, send: asgi::Sender) -> Result<(), Disconnected> {
        let reply = self.route(GatewayKind::Asgi, &scope.method, &scope.path);
        send.send(asgi::Message::start(reply.status, &reply.headers)).await?;
        send.send(asgi::Message::body(reply.body, false)).await
    }
}

#[async_trait]
impl rsgi::Application for InfoApp {
    async fn call(&self, scope: rsgi::Scope, mut protocol: rsgi::HttpProtocol) -> Result<(), rsgi::ProtocolError> {
        let reply = self.route(GatewayKind::Rsgi, &scope.method, &scope.path);
        protocol.response_bytes(reply.status.as_u16(), native_headers(&reply.headers), reply.body)
    }
}

impl wsgi::Application for InfoApp {
    fn call(&self, environ: &wsgi::Environ, start_response: wsgi::StartResponse) -> wsgi::Body {
        let reply = self.route(
            GatewayKind::Wsgi,
            environ.get("REQUEST_METHOD").unwrap_or("GET"),
            environ.get("PATH_INFO").unwrap_or("/"),
        );
        if let Err(e) = start_response.call(&wsgi::status_line(reply.status), native_headers(&reply.headers)) {
            tracing::debug!(error = %e, "start_response failed");
            return Box::new(std::iter::empty());
        }
        Box::new(std::iter::once(reply.body))
    }
}
