//! Statik Static File Engine
//!
//! Serves files from mounted directories with:
//! - Traversal-safe path resolution (lexical and symlink containment)
//! - A populate-once metadata cache with precompressed variant discovery
//! - Server-priority content negotiation over `br`, `zstd` and `gzip`
//! - Body streaming on a worker pool (`mt`) or the event loop (`st`)

mod adapter;
mod cache;
mod error;
mod executor;
mod file_server;
mod mime;
mod negotiate;
mod resolver;
mod response;

pub use adapter::{Disconnected, GatewayRequest, ResponseSink};
pub use cache::{FileEntry, MetadataCache, Variant};
pub use error::{ServeError, ServeResult};
pub use executor::{AsyncFileExecutor, BodyExecutor, WorkerPoolExecutor, executor_for};
pub use file_server::{Dispatch, StaticFiles, WriteOutcome, write_response};
pub use mime::guess_mime_type;
pub use negotiate::{AcceptEncoding, NegotiationResult, negotiate};
pub use resolver::{normalize, resolve};
pub use response::build;
