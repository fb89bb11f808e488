//! The static file engine

use crate::adapter::{GatewayRequest, ResponseSink};
use crate::cache::MetadataCache;
use crate::error::{ServeError, ServeResult};
use crate::executor::{BodyExecutor, executor_for};
use crate::negotiate::negotiate;
use crate::resolver;
use crate::response;
use futures::StreamExt;
use http::{HeaderValue, Method};
use statik_core::config::{RuntimeMode, StaticFilesConfig};
use statik_core::error::{Error, Result};
use statik_core::server::{Mount, MountTable, ResponseBody, StaticRequest, StaticResponse};
use std::io;
use std::sync::Arc;

/// What happened to a request offered to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The path matched a mount and a response was written
    Handled(WriteOutcome),
    /// No mount matched; the request belongs to the application
    Passthrough,
}

/// How writing a response to a sink ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Complete,
    /// The sink stopped accepting data
    Disconnected,
    /// The body failed after headers were committed
    Aborted,
}

/// Serves files from a set of mounts
#[derive(Debug)]
pub struct StaticFiles {
    mounts: MountTable,
    cache: MetadataCache,
    executor: Arc<dyn BodyExecutor>,
    cache_control: HeaderValue,
}

impl StaticFiles {
    /// Build the engine, failing on any mount or policy misconfiguration
    pub fn new(config: &StaticFilesConfig, mode: RuntimeMode) -> Result<Self> {
        Self::with_executor(config, executor_for(mode, config.chunk_size))
    }

    pub fn with_executor(config: &StaticFilesConfig, executor: Arc<dyn BodyExecutor>) -> Result<Self> {
        config.validate()?;
        let mounts = MountTable::new(&config.mounts)?;
        let cache_control = HeaderValue::from_str(&config.cache_control)
            .map_err(|e| Error::Config(format!("invalid cache_control {:?}: {}", config.cache_control, e)))?;

        tracing::info!(
            mounts = mounts.mounts().len(),
            mode = %executor.mode(),
            "📦 Static file engine ready"
        );

        Ok(Self {
            mounts,
            cache: MetadataCache::new(config.precompressed.clone()),
            executor,
            cache_control,
        })
    }

    pub fn mode(&self) -> RuntimeMode {
        self.executor.mode()
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Whether `path` falls under a mount
    pub fn matches(&self, path: &str) -> bool {
        self.mounts.match_path(path).is_some()
    }

    /// Produce the response for `request`, or `None` when no mount matches.
    ///
    /// Per-request failures are already turned into status codes here. For
    /// a `200` with a body, the first chunk has been read, so a file that
    /// vanished after resolution is reported as `500` rather than streamed.
    pub async fn handle(&self, request: &StaticRequest) -> Option<StaticResponse> {
        let (mount, relative) = self.mounts.match_path(&request.path)?;

        let response = match self.respond(mount, relative, request).await {
            Ok(response) => response,
            Err(e) => error_response(&request.path, e),
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            "📄 Static request"
        );

        Some(if request.method == Method::HEAD {
            response.without_body()
        } else {
            response
        })
    }

    /// Offer a native request to the engine and, if it matches a mount,
    /// write the response to `sink`
    pub async fn serve<R, S>(&self, request: &R, sink: &mut S) -> Dispatch
    where
        R: GatewayRequest + Sync + ?Sized,
        S: ResponseSink + ?Sized,
    {
        let Some(request) = request.to_static_request() else {
            return Dispatch::Passthrough;
        };
        match self.handle(&request).await {
            Some(response) => Dispatch::Handled(write_response(response, sink).await),
            None => Dispatch::Passthrough,
        }
    }

    async fn respond(&self, mount: &Mount, relative: &str, request: &StaticRequest) -> ServeResult<StaticResponse> {
        if request.method != Method::GET && request.method != Method::HEAD {
            return Err(ServeError::MethodNotAllowed);
        }

        let entry = resolver::resolve(mount, relative, &self.cache).await?;
        let accept_encoding = request.accept_encoding();
        let negotiation = negotiate(&entry, accept_encoding.as_deref());
        let mut response = response::build(&entry, &negotiation, &self.cache_control);

        let variant = negotiation.variant;
        if request.method == Method::HEAD || variant.size == 0 {
            return Ok(response);
        }

        let mut stream = self.executor.stream(variant.path.clone(), variant.size);
        let first = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(ServeError::Io(e)),
            None => return Err(ServeError::Io(io::ErrorKind::UnexpectedEof.into())),
        };
        response.body = ResponseBody::Stream(Box::pin(
            futures::stream::once(async move { Ok(first) }).chain(stream),
        ));
        Ok(response)
    }
}

fn error_response(path: &str, error: ServeError) -> StaticResponse {
    match error {
        ServeError::NotFound => StaticResponse::not_found(),
        ServeError::MethodNotAllowed => StaticResponse::method_not_allowed(),
        ServeError::Io(e) => {
            tracing::error!(path = %path, error = %e, "❌ Failed to read resolved file");
            StaticResponse::internal_error()
        }
    }
}

/// Drive `response` into `sink`, pulling the body only as fast as the sink
/// accepts it. Dropping out early drops the body stream and its file.
pub async fn write_response<S>(response: StaticResponse, sink: &mut S) -> WriteOutcome
where
    S: ResponseSink + ?Sized,
{
    let StaticResponse { status, headers, body } = response;

    if sink.start(status, &headers).await.is_err() {
        return WriteOutcome::Disconnected;
    }

    match body {
        ResponseBody::Empty => {}
        ResponseBody::Full(bytes) => {
            if !bytes.is_empty() && sink.send(bytes).await.is_err() {
                return WriteOutcome::Disconnected;
            }
        }
        ResponseBody::Stream(mut stream) => {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        if sink.send(chunk).await.is_err() {
                            tracing::debug!("Client disconnected mid-stream");
                            return WriteOutcome::Disconnected;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "⚠️ Body failed after headers were sent, aborting response");
                        sink.abort();
                        return WriteOutcome::Aborted;
                    }
                }
            }
        }
    }

    match sink.finish().await {
        Ok(()) => WriteOutcome::Complete,
        Err(_) => WriteOutcome::Disconnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Disconnected;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::StatusCode;
    use http::header::{ALLOW, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
    use statik_core::config::MountConfig;
    use std::path::Path;

    /// Records everything written; fails sends after `limit` chunks
    #[derive(Default)]
    struct RecordingSink {
        status: Option<StatusCode>,
        headers: http::HeaderMap,
        body: Vec<u8>,
        chunks: usize,
        limit: Option<usize>,
        finished: bool,
        aborted: bool,
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        async fn start(&mut self, status: StatusCode, headers: &http::HeaderMap) -> std::result::Result<(), Disconnected> {
            self.status = Some(status);
            self.headers = headers.clone();
            Ok(())
        }

        async fn send(&mut self, chunk: Bytes) -> std::result::Result<(), Disconnected> {
            if self.limit.is_some_and(|limit| self.chunks >= limit) {
                return Err(Disconnected);
            }
            self.chunks += 1;
            self.body.extend_from_slice(&chunk);
            Ok(())
        }

        async fn finish(&mut self) -> std::result::Result<(), Disconnected> {
            self.finished = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("static");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("media.png"), b"\x89PNG\r\n\x1a\nfake").unwrap();
        std::fs::write(root.join("script.js"), vec![b'i'; 140]).unwrap();
        std::fs::write(root.join("script.js.gz"), vec![b'g'; 110]).unwrap();
        std::fs::write(root.join("script.js.zst"), vec![b'z'; 91]).unwrap();
        std::fs::write(root.join("script.js.br"), vec![b'b'; 70]).unwrap();
        std::fs::write(root.join("empty.txt"), b"").unwrap();
        std::fs::write(dir.path().join("conftest.py"), "secret = 1").unwrap();
        dir
    }

    fn config(dir: &Path, chunk_size: usize) -> StaticFilesConfig {
        StaticFilesConfig {
            mounts: vec![MountConfig {
                prefix: "/static".to_string(),
                root: dir.join("static"),
            }],
            chunk_size,
            ..Default::default()
        }
    }

    fn engines(dir: &Path, chunk_size: usize) -> Vec<StaticFiles> {
        RuntimeMode::ALL
            .iter()
            .map(|mode| StaticFiles::new(&config(dir, chunk_size), *mode).unwrap())
            .collect()
    }

    async fn get(engine: &StaticFiles, request: StaticRequest) -> RecordingSink {
        let mut sink = RecordingSink::default();
        let dispatch = engine.serve(&request, &mut sink).await;
        assert_eq!(dispatch, Dispatch::Handled(WriteOutcome::Complete));
        sink
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serves_file() {
        let dir = fixture();
        for engine in engines(dir.path(), 4) {
            let sink = get(&engine, StaticRequest::new(Method::GET, "/static/media.png")).await;
            assert_eq!(sink.status, Some(StatusCode::OK));
            assert_eq!(sink.headers[CONTENT_TYPE], "image/png");
            assert_eq!(sink.headers[CACHE_CONTROL], "max-age=86400");
            assert_eq!(sink.body, b"\x89PNG\r\n\x1a\nfake");
            assert!(sink.finished);
        }
    }

    #[tokio::test]
    async fn test_not_found_and_traversal() {
        let dir = fixture();
        for engine in engines(dir.path(), 64) {
            for path in [
                "/static/missing.png",
                "/static/../conftest.py",
                "/static/%2e%2e/conftest.py",
                "/static",
                "/static/",
            ] {
                let response = engine.handle(&StaticRequest::new(Method::GET, path)).await.unwrap();
                assert_eq!(response.status, StatusCode::NOT_FOUND, "{path}");
            }
        }
    }

    #[tokio::test]
    async fn test_unmounted_paths_pass_through() {
        let dir = fixture();
        for engine in engines(dir.path(), 64) {
            for path in ["/info", "/staticfoo/media.png", "/"] {
                let mut sink = RecordingSink::default();
                let request = StaticRequest::new(Method::GET, path);
                assert_eq!(engine.serve(&request, &mut sink).await, Dispatch::Passthrough);
                assert!(sink.status.is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let dir = fixture();
        for engine in engines(dir.path(), 64) {
            for method in [Method::POST, Method::PUT, Method::DELETE] {
                let response = engine
                    .handle(&StaticRequest::new(method, "/static/media.png"))
                    .await
                    .unwrap();
                assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
                assert_eq!(response.headers[ALLOW], "GET, HEAD");
            }
        }
    }

    #[tokio::test]
    async fn test_head_matches_get_without_body() {
        let dir = fixture();
        for engine in engines(dir.path(), 64) {
            let get_sink = get(
                &engine,
                StaticRequest::new(Method::GET, "/static/script.js").header("accept-encoding", "gzip"),
            )
            .await;
            let head_sink = get(
                &engine,
                StaticRequest::new(Method::HEAD, "/static/script.js").header("accept-encoding", "gzip"),
            )
            .await;

            assert_eq!(get_sink.headers, head_sink.headers);
            assert_eq!(head_sink.headers[CONTENT_LENGTH], "110");
            assert!(head_sink.body.is_empty());
            assert_eq!(get_sink.body.len(), 110);
        }
    }

    #[tokio::test]
    async fn test_negotiation_through_engine() {
        let dir = fixture();
        let cases = [
            ("identity", None, b'i', 140),
            ("gzip", Some("gzip"), b'g', 110),
            ("gzip, zstd", Some("zstd"), b'z', 91),
            ("gzip, zstd, br", Some("br"), b'b', 70),
        ];
        for engine in engines(dir.path(), 32) {
            for (accept, encoding, fill, size) in cases {
                let request = StaticRequest::new(Method::GET, "/static/script.js").header("Accept-Encoding", accept);
                let sink = get(&engine, request).await;
                assert_eq!(sink.headers.get(CONTENT_ENCODING).map(|v| v.to_str().unwrap()), encoding);
                assert_eq!(sink.headers[CONTENT_TYPE], "text/javascript");
                assert_eq!(sink.body, vec![fill; size], "{accept}");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_modes_are_equivalent() {
        let dir = fixture();
        let [mt, st]: [StaticFiles; 2] = engines(dir.path(), 16).try_into().unwrap();

        for (path, accept) in [("/static/script.js", "br"), ("/static/media.png", ""), ("/static/nope", "")] {
            let request = StaticRequest::new(Method::GET, path).header("accept-encoding", accept);
            let a = get(&mt, request.clone()).await;
            let b = get(&st, request.clone()).await;
            assert_eq!(a.status, b.status);
            assert_eq!(a.headers, b.headers);
            assert_eq!(a.body, b.body);

            let again = get(&mt, request).await;
            assert_eq!(again.headers, a.headers);
            assert_eq!(again.body, a.body);
        }
    }

    #[tokio::test]
    async fn test_zero_length_file() {
        let dir = fixture();
        for engine in engines(dir.path(), 64) {
            let sink = get(&engine, StaticRequest::new(Method::GET, "/static/empty.txt")).await;
            assert_eq!(sink.status, Some(StatusCode::OK));
            assert_eq!(sink.headers[CONTENT_LENGTH], "0");
            assert!(sink.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_vanished_variant_is_internal_error() {
        let dir = fixture();
        let variant = dir.path().join("static").join("script.js.br");
        for engine in engines(dir.path(), 64) {
            let request = StaticRequest::new(Method::GET, "/static/script.js").header("accept-encoding", "br");
            assert_eq!(engine.handle(&request).await.unwrap().status, StatusCode::OK);

            // Still listed in the cached entry, but gone from disk
            std::fs::remove_file(&variant).unwrap();
            let response = engine.handle(&request).await.unwrap();
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

            std::fs::write(&variant, vec![b'b'; 70]).unwrap();
        }
    }

    #[tokio::test]
    async fn test_truncated_file_aborts_stream() {
        let dir = fixture();
        let path = dir.path().join("static").join("media.png");
        for engine in engines(dir.path(), 4) {
            std::fs::write(&path, vec![b'x'; 32]).unwrap();
            assert_eq!(
                engine.handle(&StaticRequest::new(Method::GET, "/static/media.png")).await.unwrap().status,
                StatusCode::OK
            );
            std::fs::write(&path, vec![b'x'; 10]).unwrap();

            let mut sink = RecordingSink::default();
            let request = StaticRequest::new(Method::GET, "/static/media.png");
            let dispatch = engine.serve(&request, &mut sink).await;
            assert_eq!(dispatch, Dispatch::Handled(WriteOutcome::Aborted));
            assert!(sink.aborted);
            assert!(!sink.finished);
            assert_eq!(sink.headers[CONTENT_LENGTH], "32");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_client_disconnect_stops_streaming() {
        let dir = fixture();
        for engine in engines(dir.path(), 8) {
            let mut sink = RecordingSink {
                limit: Some(2),
                ..Default::default()
            };
            let request = StaticRequest::new(Method::GET, "/static/script.js");
            let dispatch = engine.serve(&request, &mut sink).await;
            assert_eq!(dispatch, Dispatch::Handled(WriteOutcome::Disconnected));
            assert!(!sink.body.is_empty() && sink.body.len() <= 16);
            assert!(!sink.finished);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nested_roots_keep_their_own_variants() {
        let dir = tempfile::tempdir().unwrap();
        let outer = dir.path().join("outer");
        let inner = outer.join("sub");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(outer.join("secret.gz"), "OUTSIDE-INNER-ROOT").unwrap();
        std::fs::write(inner.join("app.js"), "app").unwrap();
        std::os::unix::fs::symlink(outer.join("secret.gz"), inner.join("app.js.gz")).unwrap();

        let config = StaticFilesConfig {
            mounts: vec![
                MountConfig {
                    prefix: "/a".to_string(),
                    root: outer.clone(),
                },
                MountConfig {
                    prefix: "/b".to_string(),
                    root: inner.clone(),
                },
            ],
            ..Default::default()
        };

        for mode in RuntimeMode::ALL {
            let engine = StaticFiles::new(&config, mode).unwrap();

            let wide = get(&engine, StaticRequest::new(Method::GET, "/a/sub/app.js").header("accept-encoding", "gzip")).await;
            assert_eq!(wide.headers[CONTENT_ENCODING], "gzip");
            assert_eq!(wide.body, b"OUTSIDE-INNER-ROOT");

            let narrow = get(&engine, StaticRequest::new(Method::GET, "/b/app.js").header("accept-encoding", "gzip")).await;
            assert!(narrow.headers.get(CONTENT_ENCODING).is_none(), "{mode}");
            assert_eq!(narrow.body, b"app");
        }
    }

    #[test]
    fn test_overlapping_mounts_rejected() {
        let dir = fixture();
        let mut config = config(dir.path(), 64);
        config.mounts.push(MountConfig {
            prefix: "/static/".to_string(),
            root: dir.path().join("static"),
        });
        assert!(matches!(
            StaticFiles::new(&config, RuntimeMode::St),
            Err(Error::MisconfiguredMount(_))
        ));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let dir = fixture();
        let mut config = config(dir.path(), 64);
        assert!(config.validate().is_ok());

        config.cache_control = "  ".to_string();
        assert!(config.validate().is_err());
        assert!(matches!(StaticFiles::new(&config, RuntimeMode::Mt), Err(Error::Config(_))));

        config.cache_control = "no-cache".to_string();
        config.chunk_size = 0;
        assert!(matches!(StaticFiles::new(&config, RuntimeMode::St), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = StaticFilesConfig {
            mounts: vec![MountConfig {
                prefix: "/assets".to_string(),
                root: dir.path().join("does-not-exist"),
            }],
            ..Default::default()
        };
        assert!(StaticFiles::new(&config, RuntimeMode::Mt).is_err());
    }
}
