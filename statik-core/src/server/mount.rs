//! Mount table: URL prefixes bound to filesystem roots
//!
//! Built once at server construction. Matching is segment-exact: a mount at
//! `/static` owns `/static` and `/static/...` but never `/staticfoo`, and a
//! path that matches no mount is left to the application.

use crate::config::MountConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A URL prefix bound to a canonical filesystem root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    prefix: String,
    root: PathBuf,
}

impl Mount {
    /// Create a mount, canonicalizing `root`.
    pub fn new(prefix: &str, root: impl AsRef<Path>) -> Result<Self> {
        let prefix = Self::normalize_prefix(prefix)?;
        let root = root.as_ref();

        let canonical = std::fs::canonicalize(root).map_err(|e| {
            Error::MisconfiguredMount(format!("root {} for {}: {}", root.display(), prefix, e))
        })?;
        if !canonical.is_dir() {
            return Err(Error::MisconfiguredMount(format!(
                "root {} for {} is not a directory",
                canonical.display(),
                prefix
            )));
        }

        Ok(Self {
            prefix,
            root: canonical,
        })
    }

    /// URL prefix, without trailing slash
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Canonical filesystem root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the mount-relative remainder of `path` if this mount owns it.
    ///
    /// The prefix is stripped exactly once.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }

    fn normalize_prefix(prefix: &str) -> Result<String> {
        if !prefix.starts_with('/') {
            return Err(Error::MisconfiguredMount(format!(
                "prefix {:?} must start with '/'",
                prefix
            )));
        }
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::MisconfiguredMount(
                "prefix '/' would shadow every application route".to_string(),
            ));
        }
        if trimmed.contains("//") || trimmed.contains('?') || trimmed.contains('#') {
            return Err(Error::MisconfiguredMount(format!("invalid prefix {:?}", prefix)));
        }
        if trimmed.split('/').any(|s| s == "." || s == "..") {
            return Err(Error::MisconfiguredMount(format!(
                "prefix {:?} contains dot segments",
                prefix
            )));
        }
        Ok(trimmed.to_string())
    }

    /// True when either prefix owns paths of the other
    fn overlaps(&self, other: &Mount) -> bool {
        other.strip(&self.prefix).is_some() || self.strip(&other.prefix).is_some()
    }
}

/// Static mapping from URL prefixes to mounts
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    /// Longest prefix first
    mounts: Vec<Arc<Mount>>,
}

impl MountTable {
    /// Build the table, rejecting overlapping or invalid mounts
    pub fn new(configs: &[MountConfig]) -> Result<Self> {
        let mut mounts: Vec<Arc<Mount>> = Vec::with_capacity(configs.len());

        for config in configs {
            let mount = Mount::new(&config.prefix, &config.root)?;
            if let Some(existing) = mounts.iter().find(|m| m.overlaps(&mount)) {
                return Err(Error::MisconfiguredMount(format!(
                    "prefix {} overlaps {}",
                    mount.prefix(),
                    existing.prefix()
                )));
            }
            tracing::info!(
                prefix = %mount.prefix(),
                root = %mount.root().display(),
                "📁 Registered static mount"
            );
            mounts.push(Arc::new(mount));
        }

        mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { mounts })
    }

    /// Find the mount owning `path` and the mount-relative remainder
    pub fn match_path<'a>(&self, path: &'a str) -> Option<(&Arc<Mount>, &'a str)> {
        self.mounts
            .iter()
            .find_map(|mount| mount.strip(path).map(|rest| (mount, rest)))
    }

    /// Get all mounts
    pub fn mounts(&self) -> &[Arc<Mount>] {
        &self.mounts
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
