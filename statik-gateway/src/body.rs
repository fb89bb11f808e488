//! hyper response plumbing shared by the gateways

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use statik_files::Disconnected;
use std::io;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Body type handed to hyper by every gateway
pub type HttpBody = UnsyncBoxBody<Bytes, io::Error>;

/// Chunks buffered between a producer and the connection
const BODY_CHANNEL_DEPTH: usize = 8;

pub(crate) fn empty() -> HttpBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

pub(crate) fn full(bytes: impl Into<Bytes>) -> HttpBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

pub(crate) fn from_stream<S>(stream: S) -> HttpBody
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}

pub(crate) fn response(status: StatusCode, headers: HeaderMap, body: HttpBody) -> Response<HttpBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Plain-text response for failures inside the gateway itself
pub(crate) fn error(status: StatusCode) -> Response<HttpBody> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(reason.len()));
    response(status, headers, full(reason))
}

/// Collect native header pairs, dropping any that are not valid HTTP
pub(crate) fn header_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> HeaderMap
where
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (
            HeaderName::from_bytes(name.as_ref()),
            HeaderValue::from_bytes(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(
                name = %String::from_utf8_lossy(name.as_ref()),
                "Dropping invalid header"
            ),
        }
    }
    headers
}

/// Producing half of a streamed response body
#[derive(Debug, Clone)]
pub(crate) struct BodySender {
    tx: mpsc::Sender<io::Result<Bytes>>,
    aborted: CancellationToken,
}

/// A bounded body channel; the body ends when every sender is dropped,
/// or fails as soon as any sender aborts, buffered chunks included
pub(crate) fn body_channel() -> (BodySender, HttpBody) {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
    let aborted = CancellationToken::new();
    let chunks = futures::stream::unfold(Some((rx, aborted.clone())), |state| async move {
        let (mut rx, aborted) = state?;
        tokio::select! {
            biased;
            _ = aborted.cancelled() => Some((Err(aborted_error()), None)),
            item = rx.recv() => item.map(|item| (item, Some((rx, aborted)))),
        }
    });
    (BodySender { tx, aborted }, from_stream(chunks))
}

fn aborted_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "response aborted")
}

impl BodySender {
    pub(crate) async fn send(&self, chunk: Bytes) -> Result<(), Disconnected> {
        self.tx.send(Ok(chunk)).await.map_err(|_| Disconnected)
    }

    /// For producers running on a blocking thread
    pub(crate) fn blocking_send(&self, chunk: Bytes) -> Result<(), Disconnected> {
        self.tx.blocking_send(Ok(chunk)).map_err(|_| Disconnected)
    }

    /// Fail the body so the connection is torn down instead of ending cleanly
    pub(crate) fn abort(self) {
        self.aborted.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_body_collects_in_order() {
        let (tx, body) = body_channel();
        tokio::spawn(async move {
            tx.send(Bytes::from_static(b"hello ")).await.unwrap();
            tx.send(Bytes::from_static(b"world")).await.unwrap();
        });
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn test_aborted_body_fails() {
        let (tx, body) = body_channel();
        tx.send(Bytes::from_static(b"partial")).await.unwrap();
        tx.abort();
        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_abort_with_full_channel_fails() {
        let (tx, body) = body_channel();
        for _ in 0..BODY_CHANNEL_DEPTH {
            tx.send(Bytes::from_static(b"chunk")).await.unwrap();
        }
        tx.abort();
        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_abort_from_one_clone_fails_body() {
        let (tx, body) = body_channel();
        let other = tx.clone();
        tx.send(Bytes::from_static(b"partial")).await.unwrap();
        tx.abort();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), body.collect()).await;
        assert!(result.unwrap().is_err());
        drop(other);
    }

    #[tokio::test]
    async fn test_dropped_body_disconnects_sender() {
        let (tx, body) = body_channel();
        drop(body);
        assert_eq!(tx.send(Bytes::from_static(b"x")).await, Err(Disconnected));
    }

    #[test]
    fn test_header_map_skips_invalid() {
        let headers = header_map([
            ("Content-Type", "text/plain"),
            ("bad header", "x"),
            ("x-multi", "a"),
            ("x-multi", "b"),
        ]);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers["content-type"], "text/plain");
        assert_eq!(headers.get_all("x-multi").iter().count(), 2);
    }

    #[test]
    fn test_error_response() {
        let response = error(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[http::header::CONTENT_LENGTH], "21");
    }
}
