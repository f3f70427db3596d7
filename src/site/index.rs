//! Content index - one recursive walk, frozen before the first request
//!
//! The index maps canonical URL paths to [`FileRecord`]s. It is built
//! single-threaded at boot and never mutated afterwards, so request
//! handlers share it behind an `Arc` without any locking.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use walkdir::WalkDir;

use crate::error::{Result, SiteError};
use crate::site::record::{FileHandle, FileRecord, FileStat};

/// Immutable URL path → record map over one content root
pub struct ContentIndex {
    root: PathBuf,
    files: HashMap<String, FileRecord>,
}

impl ContentIndex {
    /// Walk `root` and build the index.
    ///
    /// Files at or below `inline_threshold` bytes are read fully into
    /// memory; larger files are stored as disk references. A failure on
    /// one entry logs an error and omits that entry, leaving a partial
    /// index; only the root itself being unreadable is fatal.
    pub fn build(root: &Path, inline_threshold: u64) -> Result<Self> {
        let root = root.canonicalize().map_err(|source| SiteError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        std::fs::read_dir(&root).map_err(|source| SiteError::Root {
            path: root.clone(),
            source,
        })?;

        let mut files = HashMap::new();

        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::error!("error walking {:?}: {}", err.path(), err);
                    continue;
                }
            };

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::error!("error with file {:?}: {}", entry.path(), err);
                    continue;
                }
            };

            let url_path = url_path_for(&root, entry.path());

            if meta.is_dir() {
                tracing::debug!(path = %entry.path().display(), url = %url_path, "indexed directory");
                files.insert(
                    url_path.clone(),
                    FileRecord {
                        url_path,
                        fs_path: entry.path().to_path_buf(),
                        directory: true,
                        size: 0,
                        mime: String::new(),
                        modified: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                        contents: None,
                    },
                );
                continue;
            }

            let mime = mime_guess::from_path(entry.path())
                .first_or_octet_stream()
                .to_string();
            tracing::debug!(
                path = %entry.path().display(),
                url = %url_path,
                size = meta.len(),
                mime = %mime,
                "indexed file"
            );

            // large files keep only the reference and are read per request
            let contents = if meta.len() > inline_threshold {
                None
            } else {
                match std::fs::read(entry.path()) {
                    Ok(bytes) => Some(Bytes::from(bytes)),
                    Err(err) => {
                        tracing::error!("failed to read file {:?}: {}", entry.path(), err);
                        continue;
                    }
                }
            };

            files.insert(
                url_path.clone(),
                FileRecord {
                    url_path,
                    fs_path: entry.path().to_path_buf(),
                    directory: false,
                    size: meta.len(),
                    mime,
                    modified: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
                    contents,
                },
            );
        }

        Ok(Self { root, files })
    }

    /// Constant-time lookup by canonical URL path.
    pub fn lookup(&self, url_path: &str) -> Option<&FileRecord> {
        self.files.get(url_path)
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Bytes held in inline buffers.
    pub fn inline_bytes(&self) -> u64 {
        self.files
            .values()
            .filter_map(|r| r.contents.as_ref())
            .map(|c| c.len() as u64)
            .sum()
    }

    /// Open a handle for `url_path`, falling through to the disk
    /// filesystem when no record exists (paths not captured at walk time).
    pub async fn open(&self, url_path: &str) -> std::io::Result<FileHandle> {
        if let Some(record) = self.lookup(url_path) {
            return record.open().await;
        }

        tracing::debug!(path = %url_path, "index miss, falling through to disk");
        open_from_disk(&self.root, url_path).await
    }
}

/// Derive the canonical URL path for `path` under `root`.
///
/// Components are joined with forward slashes regardless of the host
/// separator; the root itself maps to `/`.
fn url_path_for(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut url = String::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            url.push('/');
            url.push_str(&part.to_string_lossy());
        }
    }
    if url.is_empty() {
        url.push('/');
    }
    url
}

/// Resolve a request path to a relative filesystem path.
///
/// Rejects `.` and `..` components so a request can never escape the
/// content root. Returns `None` for paths that do not resolve.
fn sanitize_request_path(url_path: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    for part in url_path.split('/') {
        match part {
            "" => continue,
            "." | ".." => return None,
            part => rel.push(part),
        }
    }
    Some(rel)
}

/// Open `url_path` directly from disk under `root`.
pub(crate) async fn open_from_disk(root: &Path, url_path: &str) -> std::io::Result<FileHandle> {
    let rel = sanitize_request_path(url_path)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "invalid path"))?;
    let fs_path = root.join(rel);

    let file = tokio::fs::File::open(&fs_path).await?;
    let meta = file.metadata().await?;
    let stat = FileStat::from_metadata(&fs_path, &meta);

    if stat.directory {
        return Ok(FileHandle::memory(Bytes::new(), stat));
    }

    Ok(FileHandle::disk(file, stat))
}
