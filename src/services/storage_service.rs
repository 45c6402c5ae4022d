//! src/services/storage_service.rs
//!
//! StorageService: the per-shard blob store. Chunks are plain files named
//! after their chunk name under `base_path`. There is no metadata here; the
//! metadata authority owns the chunk -> shard mapping.

use bytes::Bytes;
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_CHUNK_NAME_LEN: usize = 1024;
const TMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("chunk `{0}` not found")]
    ChunkNotFound(String),
    #[error("invalid chunk name")]
    InvalidChunkName,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Serialize, Debug)]
pub struct ChunkStat {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Serialize, Debug)]
pub struct ShardStats {
    pub shard: String,
    pub chunk_count: usize,
    pub chunks: Vec<ChunkStat>,
}

#[derive(Clone)]
pub struct StorageService {
    /// Name of the shard this store serves.
    pub shard: String,

    /// Directory holding the chunk files.
    pub base_path: PathBuf,
}

impl StorageService {
    pub fn new(shard: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            shard: shard.into(),
            base_path: base_path.into(),
        }
    }

    /// Create the data directory if it is missing.
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    /// Chunk names become file names directly, so anything that could
    /// escape `base_path` is refused.
    fn ensure_name_safe(&self, name: &str) -> StorageResult<()> {
        if name.is_empty() || name.len() > MAX_CHUNK_NAME_LEN {
            return Err(StorageError::InvalidChunkName);
        }
        if name.starts_with('.') || name.contains('/') || name.contains('\\') {
            return Err(StorageError::InvalidChunkName);
        }
        if name.bytes().any(|b| b.is_ascii_control()) {
            return Err(StorageError::InvalidChunkName);
        }
        Ok(())
    }

    fn chunk_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    /// Write a chunk durably: temp file, fsync, rename over any old copy.
    pub async fn put_chunk(&self, name: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_name_safe(name)?;
        let path = self.chunk_path(name);
        let tmp_path = self
            .base_path
            .join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));

        let mut file = File::create(&tmp_path).await?;
        if let Err(err) = write_all_synced(&mut file, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        debug!(chunk = name, bytes = data.len(), "wrote chunk {}", path.display());
        Ok(())
    }

    pub async fn get_chunk(&self, name: &str) -> StorageResult<Bytes> {
        self.ensure_name_safe(name)?;
        match fs::read(self.chunk_path(name)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::ChunkNotFound(name.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    pub async fn delete_chunk(&self, name: &str) -> StorageResult<()> {
        self.ensure_name_safe(name)?;
        match fs::remove_file(self.chunk_path(name)).await {
            Ok(_) => {
                debug!(chunk = name, "removed chunk");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::ChunkNotFound(name.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// List stored chunks with their sizes, sorted by name. In-flight temp
    /// files are skipped.
    pub async fn stats(&self) -> StorageResult<ShardStats> {
        let mut entries = fs::read_dir(&self.base_path).await?;
        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TMP_PREFIX) || name.starts_with(".readyz-") {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                chunks.push(ChunkStat {
                    name,
                    size_bytes: meta.len(),
                });
            }
        }
        chunks.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ShardStats {
            shard: self.shard.clone(),
            chunk_count: chunks.len(),
            chunks,
        })
    }
}

async fn write_all_synced(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> StorageService {
        let store = StorageService::new("s1", dir.path().join("data_s1"));
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .put_chunk("b_0_f", Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        assert_eq!(store.get_chunk("b_0_f").await.unwrap(), &b"abcd"[..]);

        store.delete_chunk("b_0_f").await.unwrap();
        assert!(matches!(
            store.get_chunk("b_0_f").await,
            Err(StorageError::ChunkNotFound(_))
        ));
        assert!(matches!(
            store.delete_chunk("b_0_f").await,
            Err(StorageError::ChunkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_names_escaping_the_directory() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        for name in ["", "../etc", "a/b", ".hidden", "a\\b"] {
            assert!(matches!(
                store.put_chunk(name, Bytes::new()).await,
                Err(StorageError::InvalidChunkName)
            ));
        }
    }

    #[tokio::test]
    async fn stats_list_chunks_by_name() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.put_chunk("b_1_f", Bytes::from_static(b"xy")).await.unwrap();
        store.put_chunk("b_0_f", Bytes::from_static(b"abcd")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.shard, "s1");
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.chunks[0].name, "b_0_f");
        assert_eq!(stats.chunks[0].size_bytes, 4);
        assert_eq!(stats.chunks[1].size_bytes, 2);
    }
}
