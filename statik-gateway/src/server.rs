//! HTTP listener and execution-mode runtimes

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

use statik_core::config::{RuntimeMode, ServerConfig, StatikConfig};
use statik_core::{Error, Result};
use statik_files::StaticFiles;

use crate::app::InfoApp;
use crate::{Gateway, gateway_for};

/// How long in-flight connections may run after shutdown is requested
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Build the runtime for the configured execution mode
pub fn build_runtime(config: &ServerConfig) -> Result<Runtime> {
    let mut builder = match config.mode {
        RuntimeMode::Mt => {
            let mut builder = tokio::runtime::Builder::new_multi_thread();
            builder.worker_threads(config.workers);
            builder
        }
        RuntimeMode::St => tokio::runtime::Builder::new_current_thread(),
    };

    builder
        .max_blocking_threads(config.blocking_threads)
        .thread_name("statik-worker")
        .enable_all()
        .build()
        .map_err(|e| Error::Server(format!("Failed to build {} runtime: {}", config.mode, e)))
}

/// Build the engine and the configured gateway in front of `InfoApp`
pub fn build_gateway(config: &StatikConfig) -> Result<Arc<dyn Gateway>> {
    let files = Arc::new(StaticFiles::new(&config.static_files, config.server.mode)?);
    let app = Arc::new(InfoApp::new(config.server.mode));
    Ok(gateway_for(config.server.gateway, files, app))
}

/// Run the server until Ctrl-C
pub fn run(config: &StatikConfig) -> Result<()> {
    let addr = config.server.socket_addr()?;
    let gateway = build_gateway(config)?;
    let runtime = build_runtime(&config.server)?;

    tracing::info!(
        gateway = %config.server.gateway,
        mode = %config.server.mode,
        "⚙️ Runtime ready"
    );

    let result = runtime.block_on(async move {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind {}: {}", addr, e)))?;
        serve(listener, gateway, shutdown_signal()).await
    });

    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("🛑 Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Accept connections on `listener` until `shutdown` resolves, then give
/// open connections up to [`SHUTDOWN_GRACE`] to finish
pub async fn serve<F>(listener: TcpListener, gateway: Arc<dyn Gateway>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    tracing::info!("🚀 Statik listening on http://{} ({} gateway)", addr, gateway.kind());

    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let io = TokioIo::new(stream);
        let gateway = gateway.clone();
        let service = service_fn(move |req: Request<Incoming>| {
            let gateway = gateway.clone();
            async move {
                let (parts, _body) = req.into_parts();
                Ok::<_, Infallible>(gateway.handle(Request::from_parts(parts, ())).await)
            }
        });

        let connection = graceful.watch(http1::Builder::new().serve_connection(io, service));
        tokio::task::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!(peer = %peer, "Connection closed with error: {:?}", err);
            }
        });
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => tracing::info!("👋 All connections closed"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => tracing::warn!("Timed out waiting for connections to close"),
    }
    Ok(())
}
