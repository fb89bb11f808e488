//! Per-file metadata cache
//!
//! Entries are keyed by mount root, then canonical path, and populated once
//! on the first successful resolution. The same file reached through two
//! nested mounts gets one entry per mount, since variant containment is
//! checked against that mount's root. Lookups of populated entries take a shard read
//! lock only; concurrent misses on the same path share one population.
//! Entries are never invalidated: a file rewritten on disk keeps the facts
//! recorded at first sight for the lifetime of the cache.

use crate::mime::guess_mime_type;
use dashmap::DashMap;
use statik_core::config::{Encoding, PrecompressedConfig};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::OnceCell;

/// One on-disk representation of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub encoding: Encoding,
    /// Filename suffix, empty for identity
    pub suffix: String,
    /// Canonical path of the representation
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Cached facts about a servable file
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the mount root
    pub relative_path: PathBuf,
    /// Canonical path
    pub absolute_path: PathBuf,
    /// MIME type of the logical asset
    pub mime_type: &'static str,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    /// Precompressed variants found next to the file, best first
    encoded: Vec<Variant>,
    /// The file itself
    identity: Variant,
}

impl FileEntry {
    /// The unencoded file
    pub fn identity(&self) -> &Variant {
        &self.identity
    }

    /// Precompressed variants in server priority order
    pub fn encoded(&self) -> &[Variant] {
        &self.encoded
    }

    /// Every available representation, identity last
    pub fn available_encodings(&self) -> impl Iterator<Item = &Variant> {
        self.encoded.iter().chain(std::iter::once(&self.identity))
    }

    pub fn variant(&self, encoding: Encoding) -> Option<&Variant> {
        self.available_encodings().find(|v| v.encoding == encoding)
    }

    pub fn has_encoded_variants(&self) -> bool {
        !self.encoded.is_empty()
    }
}

type RootEntries = DashMap<PathBuf, Arc<OnceCell<Arc<FileEntry>>>>;

/// Read-mostly map from (mount root, canonical path) to `FileEntry`
#[derive(Debug)]
pub struct MetadataCache {
    entries: DashMap<PathBuf, RootEntries>,
    precompressed: Vec<PrecompressedConfig>,
}

impl MetadataCache {
    /// Create an empty cache looking for the given variants
    pub fn new(precompressed: Vec<PrecompressedConfig>) -> Self {
        Self {
            entries: DashMap::new(),
            precompressed,
        }
    }

    /// Fetch the entry for `absolute_path`, populating it on first use.
    ///
    /// `absolute_path` must already be canonical and under `root`; variants
    /// are only accepted if they canonicalize under `root` too.
    pub async fn get_or_populate(&self, absolute_path: &Path, root: &Path) -> io::Result<Arc<FileEntry>> {
        if let Some(entry) = self.get(absolute_path, root) {
            return Ok(entry);
        }

        let cell = self
            .entries
            .entry(root.to_path_buf())
            .or_default()
            .entry(absolute_path.to_path_buf())
            .or_default()
            .clone();

        let result = cell
            .get_or_try_init(|| self.populate(absolute_path, root))
            .await
            .cloned();

        if result.is_err() {
            if let Some(files) = self.entries.get(root) {
                files.remove_if(absolute_path, |_, cell| !cell.initialized());
            }
        }
        result
    }

    /// Populated entry for `absolute_path` as seen from the mount at `root`
    pub fn get(&self, absolute_path: &Path, root: &Path) -> Option<Arc<FileEntry>> {
        let files = self.entries.get(root)?;
        let cell = files.get(absolute_path)?;
        cell.get().cloned()
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|files| files.iter().filter(|cell| cell.value().initialized()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn populate(&self, absolute_path: &Path, root: &Path) -> io::Result<Arc<FileEntry>> {
        let metadata = tokio::fs::metadata(absolute_path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
        }

        let mut encoded = Vec::with_capacity(self.precompressed.len());
        for precompressed in &self.precompressed {
            let mut candidate = absolute_path.as_os_str().to_owned();
            candidate.push(&precompressed.suffix);

            if let Some((path, size)) = probe_variant(Path::new(&candidate), root).await {
                encoded.push(Variant {
                    encoding: precompressed.encoding,
                    suffix: precompressed.suffix.clone(),
                    path,
                    size,
                });
            }
        }

        let relative_path = absolute_path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        tracing::debug!(
            path = %absolute_path.display(),
            variants = ?encoded.iter().map(|v| v.encoding.token()).collect::<Vec<_>>(),
            "🗂️ Cached file metadata"
        );

        Ok(Arc::new(FileEntry {
            relative_path,
            absolute_path: absolute_path.to_path_buf(),
            mime_type: guess_mime_type(absolute_path),
            size: metadata.len(),
            last_modified: metadata.modified().ok(),
            encoded,
            identity: Variant {
                encoding: Encoding::Identity,
                suffix: String::new(),
                path: absolute_path.to_path_buf(),
                size: metadata.len(),
            },
        }))
    }
}

/// Canonical path and size of a precompressed sibling, if it is a regular
/// file under `root`
async fn probe_variant(candidate: &Path, root: &Path) -> Option<(PathBuf, u64)> {
    let canonical = tokio::fs::canonicalize(candidate).await.ok()?;
    if !canonical.starts_with(root) {
        tracing::warn!(
            variant = %candidate.display(),
            target = %canonical.display(),
            "Ignoring precompressed variant outside mount root"
        );
        return None;
    }
    let metadata = tokio::fs::metadata(&canonical).await.ok()?;
    metadata.is_file().then(|| (canonical, metadata.len()))
}
