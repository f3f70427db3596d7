//! Per-path content records and open file handles
//!
//! A [`FileRecord`] is one entry in the content index: metadata for a path
//! plus, for small files, the full contents buffered at build time.
//! Opening a record yields a [`FileHandle`], either a zero-IO cursor over
//! the buffered bytes or a lazily opened descriptor on disk.

use std::io::{Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::SystemTime;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Metadata for one indexed path
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Canonical URL path, forward-slash separated, unique index key
    pub url_path: String,

    /// Absolute path on disk
    pub fs_path: PathBuf,

    /// Whether the record is a directory
    pub directory: bool,

    /// File size in bytes (zero for directories)
    pub size: u64,

    /// MIME type derived from the file extension
    pub mime: String,

    /// File modification time
    pub modified: SystemTime,

    /// Buffered contents, present iff the file fit the inline threshold
    pub contents: Option<Bytes>,
}

impl FileRecord {
    /// Open a handle over this record.
    ///
    /// Buffered records never touch disk. Reference records open the file
    /// at `fs_path` lazily; the file may have been removed or had its
    /// permissions changed since the walk, and that error is the caller's
    /// to surface.
    pub async fn open(&self) -> std::io::Result<FileHandle> {
        if self.directory {
            return Ok(FileHandle::memory(Bytes::new(), self.stat()));
        }

        match &self.contents {
            Some(contents) => {
                tracing::debug!(path = %self.url_path, "opening memory file");
                Ok(FileHandle::memory(contents.clone(), self.stat()))
            }
            None => {
                tracing::debug!(path = %self.url_path, fs_path = %self.fs_path.display(), "opening file from disk");
                let file = tokio::fs::File::open(&self.fs_path).await?;
                Ok(FileHandle::disk(file, self.stat()))
            }
        }
    }

    /// Snapshot of the stat fields
    pub fn stat(&self) -> FileStat {
        FileStat {
            size: self.size,
            modified: self.modified,
            mime: self.mime.clone(),
            directory: self.directory,
        }
    }
}

/// Stat information reported by a [`FileHandle`]
#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
    pub mime: String,
    pub directory: bool,
}

impl FileStat {
    /// Build a stat from disk metadata for paths served outside the index.
    pub fn from_metadata(path: &Path, meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            mime: mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string(),
            directory: meta.is_dir(),
        }
    }
}

/// An open read/seek session over one record
#[derive(Debug)]
pub struct FileHandle {
    stat: FileStat,
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    /// Seekable cursor over buffered contents
    Memory(Cursor<Bytes>),
    /// Descriptor opened lazily for this request, owned until close
    Disk(tokio::fs::File),
    /// Disk descriptor released by an explicit close
    Closed,
}

impl FileHandle {
    pub fn memory(contents: Bytes, stat: FileStat) -> Self {
        Self {
            stat,
            inner: HandleInner::Memory(Cursor::new(contents)),
        }
    }

    pub fn disk(file: tokio::fs::File, stat: FileStat) -> Self {
        Self {
            stat,
            inner: HandleInner::Disk(file),
        }
    }

    pub fn stat(&self) -> &FileStat {
        &self.stat
    }

    /// The buffered contents, when this handle is memory-backed.
    pub fn contents(&self) -> Option<Bytes> {
        match &self.inner {
            HandleInner::Memory(cursor) => Some(cursor.get_ref().clone()),
            _ => None,
        }
    }

    /// Directory listing is not supported; always empty.
    pub fn read_dir(&self) -> Vec<FileStat> {
        Vec::new()
    }

    /// Release the handle. Idempotent; a memory handle has nothing to
    /// release, a disk handle drops its descriptor and further reads fail.
    pub fn close(&mut self) {
        if matches!(self.inner, HandleInner::Disk(_)) {
            self.inner = HandleInner::Closed;
        }
    }
}

fn closed_error() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, "file handle closed")
}

impl AsyncRead for FileHandle {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            HandleInner::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            HandleInner::Disk(file) => Pin::new(file).poll_read(cx, buf),
            HandleInner::Closed => Poll::Ready(Err(closed_error())),
        }
    }
}

impl AsyncSeek for FileHandle {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> std::io::Result<()> {
        match &mut self.get_mut().inner {
            HandleInner::Memory(cursor) => Pin::new(cursor).start_seek(position),
            HandleInner::Disk(file) => Pin::new(file).start_seek(position),
            HandleInner::Closed => Err(closed_error()),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<u64>> {
        match &mut self.get_mut().inner {
            HandleInner::Memory(cursor) => Pin::new(cursor).poll_complete(cx),
            HandleInner::Disk(file) => Pin::new(file).poll_complete(cx),
            HandleInner::Closed => Poll::Ready(Err(closed_error())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    fn record(contents: Option<&[u8]>, size: u64) -> FileRecord {
        FileRecord {
            url_path: "/test.txt".to_string(),
            fs_path: PathBuf::from("/nonexistent/test.txt"),
            directory: false,
            size,
            mime: "text/plain".to_string(),
            modified: SystemTime::now(),
            contents: contents.map(|c| Bytes::copy_from_slice(c)),
        }
    }

    #[tokio::test]
    async fn test_memory_handle_read() {
        let rec = record(Some(b"hello world"), 11);
        let mut handle = rec.open().await.unwrap();

        let mut buf = Vec::new();
        handle.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello world");
        assert_eq!(handle.stat().size, 11);
        assert!(!handle.stat().directory);
    }

    #[tokio::test]
    async fn test_memory_handle_seek() {
        let rec = record(Some(b"hello world"), 11);
        let mut handle = rec.open().await.unwrap();

        let pos = handle.seek(SeekFrom::Start(6)).await.unwrap();
        assert_eq!(pos, 6);

        let mut buf = Vec::new();
        handle.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"world");
    }

    #[tokio::test]
    async fn test_memory_handle_never_touches_disk() {
        // fs_path points nowhere; open must still succeed from the buffer
        let rec = record(Some(b"cached"), 6);
        let mut handle = rec.open().await.unwrap();

        let mut buf = Vec::new();
        handle.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"cached");
    }

    #[tokio::test]
    async fn test_reference_record_opens_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"on disk").unwrap();

        let mut rec = record(None, 7);
        rec.fs_path = tmp.path().to_path_buf();

        let mut handle = rec.open().await.unwrap();
        assert!(handle.contents().is_none());

        let mut buf = Vec::new();
        handle.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"on disk");
    }

    #[tokio::test]
    async fn test_reference_record_open_missing_file() {
        let rec = record(None, 7);
        let err = rec.open().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut rec = record(None, 0);
        rec.fs_path = tmp.path().to_path_buf();

        let mut handle = rec.open().await.unwrap();
        handle.close();
        handle.close();

        let mut buf = [0u8; 4];
        assert!(handle.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_close_is_noop() {
        let rec = record(Some(b"still here"), 10);
        let mut handle = rec.open().await.unwrap();
        handle.close();

        let mut buf = Vec::new();
        handle.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"still here");
    }

    #[tokio::test]
    async fn test_directory_handle_lists_nothing() {
        let rec = FileRecord {
            url_path: "/sub".to_string(),
            fs_path: PathBuf::from("/tmp/sub"),
            directory: true,
            size: 0,
            mime: String::new(),
            modified: SystemTime::now(),
            contents: None,
        };

        let handle = rec.open().await.unwrap();
        assert!(handle.stat().directory);
        assert!(handle.read_dir().is_empty());
    }
}
