//! Opaque file handle for pipeline input
//!
//! A `RomFile` carries the metadata the pipeline inspects without reading
//! content (name, size, last-modified time) plus a way to read the bytes
//! when hashing or uploading.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a file's bytes come from
#[derive(Debug, Clone)]
enum FileSource {
    /// Read lazily from disk
    Path(PathBuf),
    /// Already in memory (drag-and-drop buffers, tests)
    Memory(Arc<[u8]>),
}

/// One user-selected input file
#[derive(Debug, Clone)]
pub struct RomFile {
    /// File name including extension, without directories
    pub name: String,
    /// Size in bytes as reported at intake
    pub size: u64,
    /// Last modification time in milliseconds since the Unix epoch
    pub last_modified: i64,
    source: FileSource,
}

impl RomFile {
    /// Build a handle from a path on disk (reads metadata only)
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;

        let last_modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self {
            name,
            size: metadata.len(),
            last_modified,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Build a handle over an in-memory buffer
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>, last_modified: i64) -> Self {
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            last_modified,
            source: FileSource::Memory(bytes),
        }
    }

    /// Path on disk, if the file is disk-backed
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Path(p) => Some(p),
            FileSource::Memory(_) => None,
        }
    }

    /// Read the full content into memory
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(p) => tokio::fs::read(p).await,
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_bytes_metadata() {
        let file = RomFile::from_bytes("mario.nes", vec![1u8, 2, 3], 1_700_000_000_000);
        assert_eq!(file.name, "mario.nes");
        assert_eq!(file.size, 3);
        assert!(file.path().is_none());
        assert_eq!(file.read_all().await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_from_path_reads_metadata_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("zelda.sfc");
        std::fs::write(&path, vec![0u8; 512]).unwrap();

        let file = RomFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "zelda.sfc");
        assert_eq!(file.size, 512);
        assert!(file.last_modified > 0);
        assert_eq!(file.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_read_after_delete_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gone.gb");
        std::fs::write(&path, b"GB").unwrap();

        let file = RomFile::from_path(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(file.read_all().await.is_err());
    }
}
