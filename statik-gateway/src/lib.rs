//! Statik Gateways
//!
//! Puts the static file engine in front of an application speaking one of
//! three gateway shapes (ASGI, RSGI, WSGI), and runs the HTTP listener under
//! either execution mode.

pub mod app;
pub mod asgi;
mod body;
pub mod rsgi;
pub mod server;
pub mod wsgi;

use async_trait::async_trait;
use http::{Request, Response};
use statik_core::config::GatewayKind;
use statik_files::StaticFiles;
use std::sync::Arc;

pub use app::InfoApp;
pub use body::HttpBody;
pub use server::{build_gateway, build_runtime, run, serve};

/// One HTTP request in, one response out, through a gateway shape
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    fn kind(&self) -> GatewayKind;

    /// Requests under a mount are answered by the static file engine;
    /// everything else goes to the application. Request bodies are not read.
    async fn handle(&self, request: Request<()>) -> Response<HttpBody>;
}

/// Select the gateway for `kind`, with `app` behind the mounts
pub fn gateway_for(kind: GatewayKind, files: Arc<StaticFiles>, app: Arc<InfoApp>) -> Arc<dyn Gateway> {
    match kind {
        GatewayKind::Asgi => Arc::new(asgi::AsgiGateway::new(files, app)),
        GatewayKind::Rsgi => Arc::new(rsgi::RsgiGateway::new(files, app)),
        GatewayKind::Wsgi => Arc::new(wsgi::WsgiGateway::new(files, app)),
    }
}
