//! File handles backed by the local file system or memory.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    file::{clamp_range, FileHandle},
};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

/// A file on disk, opened per read.
///
/// The size is captured when the handle is created.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
}

impl LocalFile {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await?;
        if metadata.is_dir() {
            return Err(BridgeError::OperationFailed(format!(
                "{} is a directory",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(path = ?path, size = metadata.len(), "Opened local file");

        Ok(Self {
            name,
            size: metadata.len(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileHandle for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        let (offset, length) = clamp_range(self.size, offset, length);
        if length == 0 {
            return Ok(Bytes::new());
        }

        let mut file = fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let len = usize::try_from(length).map_err(|_| BridgeError::OutOfRange {
            offset,
            size: self.size,
        })?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;

        trace!(path = ?self.path, offset, length, "Read range");
        Ok(Bytes::from(buf))
    }
}

/// An in-memory file.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Bytes,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        let (offset, length) = clamp_range(self.size(), offset, length);
        // Clamped to the buffer, so both bounds fit in usize.
        let start = offset as usize;
        Ok(self.data.slice(start..start + length as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_local_file_reads_ranges() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello, module").unwrap();
        tmp.flush().unwrap();

        let file = LocalFile::open(tmp.path()).await.unwrap();
        assert_eq!(file.size(), 13);

        assert_eq!(file.read_range(7, 6).await.unwrap(), Bytes::from_static(b"module"));
        assert_eq!(file.read_range(7, 600).await.unwrap(), Bytes::from_static(b"module"));
        assert!(file.read_range(13, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_file_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFile::open(dir.path()).await.is_err());
        assert!(LocalFile::open(dir.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_file() {
        let file = MemoryFile::new("clip.mp4", Bytes::from_static(b"abcdef"));
        assert_eq!(file.name(), "clip.mp4");
        assert_eq!(file.read_range(2, 2).await.unwrap(), Bytes::from_static(b"cd"));
        assert_eq!(file.read_range(4, 10).await.unwrap(), Bytes::from_static(b"ef"));
        assert!(file.read_range(10, 1).await.unwrap().is_empty());
    }
}
