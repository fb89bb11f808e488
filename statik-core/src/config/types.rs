//! Configuration type definitions
//!
//! These types represent the runtime configuration for Statik.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Root configuration for Statik
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatikConfig {
    /// Listener, gateway and runtime settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Static file mounts and serving policy
    #[serde(default)]
    pub static_files: StaticFilesConfig,

    /// Global logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StatikConfig {
    /// Check the settings that do not need the filesystem.
    ///
    /// Mount prefixes and roots are validated when the mount table is built.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.static_files.validate()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Gateway shape used to talk to the application
    #[serde(default)]
    pub gateway: GatewayKind,

    /// Execution mode
    #[serde(default)]
    pub mode: RuntimeMode,

    /// Event loop threads in multi-threaded mode
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Size of the blocking I/O worker pool in multi-threaded mode
    #[serde(default = "default_blocking_threads")]
    pub blocking_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            gateway: GatewayKind::default(),
            mode: RuntimeMode::default(),
            workers: default_workers(),
            blocking_threads: default_blocking_threads(),
        }
    }
}

impl ServerConfig {
    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        self.listen
            .parse()
            .map_err(|_| Error::Config(format!("Invalid listen address: {}", self.listen)))
    }

    fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.blocking_threads == 0 {
            return Err(Error::Config("blocking_threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_blocking_threads() -> usize {
    32
}

/// Gateway shapes the server can speak to the application
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    /// Scope + send-event interface
    Asgi,
    /// Scope + protocol object interface
    #[default]
    Rsgi,
    /// Environ + start_response interface
    Wsgi,
}

impl GatewayKind {
    /// All supported gateway shapes
    pub const ALL: [GatewayKind; 3] = [GatewayKind::Asgi, GatewayKind::Rsgi, GatewayKind::Wsgi];

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Asgi => "asgi",
            GatewayKind::Rsgi => "rsgi",
            GatewayKind::Wsgi => "wsgi",
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asgi" => Ok(GatewayKind::Asgi),
            "rsgi" => Ok(GatewayKind::Rsgi),
            "wsgi" => Ok(GatewayKind::Wsgi),
            other => Err(Error::Config(format!("Unknown gateway: {}", other))),
        }
    }
}

/// Execution modes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Several event loop threads, blocking reads on a worker pool
    #[default]
    Mt,
    /// One event loop on one thread, asynchronous reads only
    St,
}

impl RuntimeMode {
    pub const ALL: [RuntimeMode; 2] = [RuntimeMode::Mt, RuntimeMode::St];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Mt => "mt",
            RuntimeMode::St => "st",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mt" => Ok(RuntimeMode::Mt),
            "st" => Ok(RuntimeMode::St),
            other => Err(Error::Config(format!("Unknown runtime mode: {}", other))),
        }
    }
}

/// Static file serving configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFilesConfig {
    /// URL prefix to filesystem root bindings
    #[serde(default)]
    pub mounts: Vec<MountConfig>,

    /// Value of the Cache-Control header on served files
    #[serde(default = "default_cache_control")]
    pub cache_control: String,

    /// Precompressed variants to look for, best first
    #[serde(default = "default_precompressed")]
    pub precompressed: Vec<PrecompressedConfig>,

    /// Read size for body streaming
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            mounts: Vec::new(),
            cache_control: default_cache_control(),
            precompressed: default_precompressed(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl StaticFilesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_control.trim().is_empty() {
            return Err(Error::Config("cache_control must not be empty".to_string()));
        }
        if http::HeaderValue::from_str(&self.cache_control).is_err() {
            return Err(Error::Config(format!(
                "cache_control is not a valid header value: {:?}",
                self.cache_control
            )));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }

        let mut encodings = HashSet::new();
        let mut suffixes = HashSet::new();
        for variant in &self.precompressed {
            if variant.encoding == Encoding::Identity {
                return Err(Error::Config(
                    "identity is implicit and cannot be listed as a precompressed variant".to_string(),
                ));
            }
            if variant.suffix.is_empty() || variant.suffix.contains('/') {
                return Err(Error::Config(format!(
                    "Invalid suffix {:?} for {}",
                    variant.suffix, variant.encoding
                )));
            }
            if !encodings.insert(variant.encoding) {
                return Err(Error::Config(format!("Duplicate encoding: {}", variant.encoding)));
            }
            if !suffixes.insert(variant.suffix.as_str()) {
                return Err(Error::Config(format!("Duplicate suffix: {}", variant.suffix)));
            }
        }
        Ok(())
    }
}

fn default_cache_control() -> String {
    "max-age=86400".to_string()
}

fn default_precompressed() -> Vec<PrecompressedConfig> {
    vec![
        PrecompressedConfig::new(Encoding::Brotli, ".br"),
        PrecompressedConfig::new(Encoding::Zstd, ".zst"),
        PrecompressedConfig::new(Encoding::Gzip, ".gz"),
    ]
}

fn default_chunk_size() -> usize {
    64 * 1024
}

/// A single mount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MountConfig {
    /// URL path prefix, e.g. `/static`
    pub prefix: String,

    /// Directory served under the prefix
    pub root: PathBuf,
}

/// A precompressed variant: `<file><suffix>` holds the file encoded with `encoding`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrecompressedConfig {
    pub encoding: Encoding,
    pub suffix: String,
}

impl PrecompressedConfig {
    pub fn new(encoding: Encoding, suffix: impl Into<String>) -> Self {
        Self {
            encoding,
            suffix: suffix.into(),
        }
    }
}

/// Content codings known to the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[serde(rename = "br")]
    Brotli,
    #[serde(rename = "zstd")]
    Zstd,
    #[serde(rename = "gzip")]
    Gzip,
    #[serde(rename = "identity")]
    Identity,
}

impl Encoding {
    /// Get the content-encoding token
    pub fn token(&self) -> &'static str {
        match self {
            Encoding::Brotli => "br",
            Encoding::Zstd => "zstd",
            Encoding::Gzip => "gzip",
            Encoding::Identity => "identity",
        }
    }

    /// Parse an Accept-Encoding coding name (case-insensitive)
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("br") {
            Some(Encoding::Brotli)
        } else if token.eq_ignore_ascii_case("zstd") {
            Some(Encoding::Zstd)
        } else if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Some(Encoding::Gzip)
        } else if token.eq_ignore_ascii_case("identity") {
            Some(Encoding::Identity)
        } else {
            None
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Global logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
