//! Body streaming under the two execution modes
//!
//! - `WorkerPoolExecutor` (multi-threaded mode) reads with blocking calls on
//!   the runtime's blocking pool and hands chunks back to the requesting
//!   task through a bounded channel.
//! - `AsyncFileExecutor` (single-threaded mode) reads through an async file
//!   handle polled by the event loop itself, yielding between chunks.
//!
//! Both produce a lazy stream of exactly the expected number of bytes.
//! Dropping the stream closes the file: immediately for the async reader,
//! and at the next chunk hand-off for the worker pool.

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use statik_core::config::RuntimeMode;
use statik_core::server::BodyStream;
use std::io::{self, Read};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Chunks buffered between a pool worker and the requesting task
const CHANNEL_DEPTH: usize = 4;

/// Strategy for producing body bytes from a file
pub trait BodyExecutor: Send + Sync + std::fmt::Debug {
    /// Mode this executor implements
    fn mode(&self) -> RuntimeMode;

    /// Lazily stream the first `len` bytes of the file at `path`.
    ///
    /// Open and read failures are yielded as stream items; a file shorter
    /// than `len` ends the stream with `UnexpectedEof`.
    fn stream(&self, path: PathBuf, len: u64) -> BodyStream;
}

/// Select the strategy for `mode`
pub fn executor_for(mode: RuntimeMode, chunk_size: usize) -> Arc<dyn BodyExecutor> {
    match mode {
        RuntimeMode::Mt => Arc::new(WorkerPoolExecutor::new(chunk_size)),
        RuntimeMode::St => Arc::new(AsyncFileExecutor::new(chunk_size)),
    }
}

/// Blocking reads on the I/O worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolExecutor {
    chunk_size: usize,
}

impl WorkerPoolExecutor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl BodyExecutor for WorkerPoolExecutor {
    fn mode(&self) -> RuntimeMode {
        RuntimeMode::Mt
    }

    fn stream(&self, path: PathBuf, len: u64) -> BodyStream {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => return Box::pin(futures::stream::once(async move { Err(io::Error::other(e)) })),
        };

        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let chunk_size = self.chunk_size;
        handle.spawn_blocking(move || read_blocking(path, len, chunk_size, tx));

        let chunks = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Box::pin(ExactLength::new(Box::pin(chunks), len))
    }
}

/// Runs on a pool thread until EOF, `len` bytes, an error, or the receiver
/// going away
fn read_blocking(path: PathBuf, len: u64, chunk_size: usize, tx: mpsc::Sender<io::Result<Bytes>>) {
    let file = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(e) => {
            let _ = tx.blocking_send(Err(e));
            return;
        }
    };
    let mut reader = file.take(len);

    loop {
        let mut buf = vec![0u8; chunk_size];
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                buf.truncate(n);
                if tx.blocking_send(Ok(Bytes::from(buf))).is_err() {
                    tracing::debug!(path = %path.display(), "Body receiver dropped, closing file");
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
}

/// Async reads polled on the event loop thread
#[derive(Debug, Clone)]
pub struct AsyncFileExecutor {
    chunk_size: usize,
}

impl AsyncFileExecutor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl BodyExecutor for AsyncFileExecutor {
    fn mode(&self) -> RuntimeMode {
        RuntimeMode::St
    }

    fn stream(&self, path: PathBuf, len: u64) -> BodyStream {
        let chunk_size = self.chunk_size;
        let open = async move {
            let file = tokio::fs::File::open(&path).await?;
            Ok::<_, io::Error>(ReaderStream::with_capacity(file.take(len), chunk_size))
        };
        let chunks = futures::stream::once(open).try_flatten();
        Box::pin(ExactLength::new(Box::pin(chunks), len))
    }
}

/// Yields exactly `remaining` bytes from `inner`, then drops it
struct ExactLength {
    inner: Option<BodyStream>,
    remaining: u64,
}

impl ExactLength {
    fn new(inner: BodyStream, len: u64) -> Self {
        Self {
            inner: Some(inner),
            remaining: len,
        }
    }
}

impl Stream for ExactLength {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        if this.remaining == 0 {
            this.inner = None;
            return Poll::Ready(None);
        }

        match ready!(inner.poll_next_unpin(cx)) {
            Some(Ok(mut chunk)) => {
                if chunk.len() as u64 > this.remaining {
                    chunk.truncate(this.remaining as usize);
                }
                this.remaining -= chunk.len() as u64;
                if this.remaining == 0 {
                    this.inner = None;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                this.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.inner = None;
                Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended {} bytes early", this.remaining),
                ))))
            }
        }
    }
}
