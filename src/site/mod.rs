//! Static site serving core
//!
//! [`Site`] is the composition root the HTTP layer talks to: either a
//! content index over the root (the default) or a raw disk passthrough
//! when the cache is bypassed.

pub mod index;
pub mod record;

use std::path::{Path, PathBuf};

use crate::env::{env_bool, env_bytes};
use crate::error::Result;
use crate::site::index::{open_from_disk, ContentIndex};
use crate::site::record::FileHandle;

/// Disable the in-memory cache and serve every request from disk.
pub const ENV_BYPASS_CACHE: &str = "SITE_MEMORY_FILE_DISABLE";

/// Largest file size, in decimal bytes, eligible for inline buffering.
pub const ENV_INLINE_THRESHOLD: &str = "SITE_MEMORY_FILE_MAX_SIZE";

/// Default inline threshold: 2 MiB, inclusive.
pub const DEFAULT_INLINE_THRESHOLD: u64 = 2 * 1024 * 1024;

/// Cache tuning for a [`Site`]
#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// Skip the walk entirely and route every open to disk
    pub bypass_cache: bool,
    /// Inclusive upper bound for inline buffering
    pub inline_threshold: u64,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            bypass_cache: false,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

impl SiteOptions {
    /// Read the bypass flag and inline threshold from the environment.
    pub fn from_env() -> Self {
        Self {
            bypass_cache: env_bool(ENV_BYPASS_CACHE),
            inline_threshold: env_bytes(ENV_INLINE_THRESHOLD)
                .unwrap_or(DEFAULT_INLINE_THRESHOLD),
        }
    }
}

/// Static content served from one root directory
pub struct Site {
    root: PathBuf,
    index: Option<ContentIndex>,
}

impl Site {
    /// Build a site over `root`.
    ///
    /// Unless bypassed, this walks the root once and buffers every file at
    /// or below the inline threshold; the resulting index is immutable for
    /// the life of the process. With bypass on there is no walk and no
    /// cache memory at all.
    pub fn new(root: impl AsRef<Path>, options: SiteOptions) -> Result<Self> {
        let root = root.as_ref();

        if options.bypass_cache {
            tracing::info!(root = %root.display(), "memory cache bypassed, serving from disk");
            return Ok(Self {
                root: root.to_path_buf(),
                index: None,
            });
        }

        let index = ContentIndex::build(root, options.inline_threshold)?;
        tracing::info!(
            root = %root.display(),
            entries = index.len(),
            inline_bytes = index.inline_bytes(),
            "content index built"
        );

        Ok(Self {
            root: root.to_path_buf(),
            index: Some(index),
        })
    }

    /// Build a site with options read from the process environment.
    pub fn from_env(root: impl AsRef<Path>) -> Result<Self> {
        Self::new(root, SiteOptions::from_env())
    }

    /// Open a handle for a request path.
    ///
    /// This is the only capability exposed to the HTTP layer; status
    /// codes and response semantics live above.
    pub async fn open(&self, url_path: &str) -> std::io::Result<FileHandle> {
        match &self.index {
            Some(index) => index.open(url_path).await,
            None => open_from_disk(&self.root, url_path).await,
        }
    }

    /// Whether opens are routed through the in-memory index.
    pub fn cached(&self) -> bool {
        self.index.is_some()
    }

    /// Number of indexed entries; zero in bypass mode.
    pub fn indexed_entries(&self) -> usize {
        self.index.as_ref().map(ContentIndex::len).unwrap_or(0)
    }

    /// Bytes buffered inline; zero in bypass mode.
    pub fn inline_bytes(&self) -> u64 {
        self.index.as_ref().map(ContentIndex::inline_bytes).unwrap_or(0)
    }
}
