//! src/services/gateway_service.rs
//!
//! GatewayService: the chunk orchestrator. Splits uploads into chunks,
//! places and writes them, then commits metadata; resolves reads and deletes
//! through the metadata authority and fans out to the shards.
//!
//! Partial failures are reported, never compensated. A failed upload leaves
//! the chunks written so far on their shards, and a failed physical delete
//! leaves the remaining chunks behind after their metadata is gone.
//!
//! Chunk names are deterministic, so the existence check before an upload
//! only guards against duplicates that arrive after the first commit. Two
//! concurrent uploads of the same name can both pass it: the loser rewrites
//! the winner's blobs and is then rejected by the commit, leaving the
//! committed file pointing at the loser's bytes.

use crate::{
    models::chunk::ChunkPlacement,
    services::{
        meta_authority::{MetaAuthority, MetaError},
        naming::{chunk_name, validate_name},
        placement::ShardSet,
        shard_client::{ShardClient, ShardError},
    },
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, pin_mut};
use std::{fmt, io, sync::Arc};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardOp {
    Write,
    Read,
    Delete,
}

impl fmt::Display for ShardOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShardOp::Write => "write",
            ShardOp::Read => "read",
            ShardOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Meta(#[from] MetaError),
    #[error("failed to {op} chunk `{chunk}` of file `{file}` in bucket `{bucket}`: {source}")]
    Shard {
        op: ShardOp,
        bucket: String,
        file: String,
        chunk: String,
        #[source]
        source: ShardError,
    },
    #[error("failed to read upload body for file `{file}` in bucket `{bucket}`: {source}")]
    Body {
        bucket: String,
        file: String,
        #[source]
        source: io::Error,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub chunks: usize,
    pub size_bytes: u64,
}

/// A file read back from the shards.
#[derive(Debug, Clone)]
pub struct FileContents {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct GatewayService {
    pub meta: Arc<dyn MetaAuthority>,
    pub shards: Arc<ShardSet>,
    pub shard_client: ShardClient,
    pub chunk_size: usize,
}

impl GatewayService {
    pub fn new(
        meta: Arc<dyn MetaAuthority>,
        shards: Arc<ShardSet>,
        shard_client: ShardClient,
        chunk_size: usize,
    ) -> Self {
        Self {
            meta,
            shards,
            shard_client,
            chunk_size,
        }
    }

    pub async fn create_bucket(&self, bucket: &str) -> GatewayResult<()> {
        validate_name("bucket", bucket)?;
        self.meta.create_bucket(bucket).await?;
        info!(bucket, "created bucket");
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket: &str) -> GatewayResult<()> {
        validate_name("bucket", bucket)?;
        self.meta.delete_bucket(bucket).await?;
        info!(bucket, "deleted bucket");
        Ok(())
    }

    pub async fn list_files(&self, bucket: &str) -> GatewayResult<Vec<String>> {
        validate_name("bucket", bucket)?;
        Ok(self.meta.list_files(bucket).await?)
    }

    /// Upload `body` as `bucket/file`.
    ///
    /// Windows of exactly `chunk_size` bytes are cut from the stream (the
    /// last one may be shorter, an empty body gives no chunks). Each window
    /// is placed and written before the next is read. Metadata is committed
    /// only once every chunk is on its shard.
    ///
    /// A rejected duplicate leaves the existing file untouched only when it
    /// starts after that file was committed. A concurrent duplicate can
    /// overwrite the committed chunks before its own commit fails.
    pub async fn create_file<S>(
        &self,
        bucket: &str,
        file: &str,
        content_type: &str,
        body: S,
    ) -> GatewayResult<UploadSummary>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        validate_name("bucket", bucket)?;
        validate_name("file", file)?;

        // Chunk names are derived from (bucket, file, seq), so uploading over
        // an existing file would overwrite its blobs before the commit below
        // refuses the duplicate. The commit stays the authoritative check for
        // the metadata rows, but not for blob contents under concurrent uploads.
        // A missing bucket is not told apart from a missing file here: the
        // upload goes ahead and every chunk is orphaned when the commit
        // reports the bucket as not found.
        match self.meta.resolve_file(bucket, file).await {
            Ok(_) => {
                return Err(MetaError::AlreadyExists(format!(
                    "file with name {} already exists in bucket {}, updating files is not supported",
                    file, bucket
                ))
                .into());
            }
            Err(MetaError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let reader = StreamReader::new(body);
        pin_mut!(reader);
        let mut placements = Vec::new();
        let mut size_bytes = 0u64;

        loop {
            let window = read_window(&mut reader, self.chunk_size)
                .await
                .map_err(|source| GatewayError::Body {
                    bucket: bucket.to_string(),
                    file: file.to_string(),
                    source,
                })?;
            if window.is_empty() {
                break;
            }

            let seq = placements.len();
            let name = chunk_name(bucket, file, seq);
            let shard = self.shards.select_shard(&window);
            size_bytes += window.len() as u64;

            if let Err(source) = self
                .shard_client
                .put_chunk(shard, &name, window.clone())
                .await
            {
                warn!(
                    bucket, file, chunk = %name, shard = %shard.name, written = seq,
                    "chunk write failed, aborting upload"
                );
                return Err(GatewayError::Shard {
                    op: ShardOp::Write,
                    bucket: bucket.to_string(),
                    file: file.to_string(),
                    chunk: name,
                    source,
                });
            }
            debug!(bucket, file, chunk = %name, shard = %shard.name, "chunk placed");
            placements.push(ChunkPlacement::new(name, shard.name.clone()));

            if window.len() < self.chunk_size {
                break;
            }
        }

        if let Err(err) = self
            .meta
            .create_file(bucket, file, content_type, &placements)
            .await
        {
            warn!(
                bucket, file, orphaned = placements.len(), error = %err,
                "metadata commit failed after chunks were written"
            );
            return Err(err.into());
        }

        info!(bucket, file, chunks = placements.len(), size_bytes, "created file");
        Ok(UploadSummary {
            chunks: placements.len(),
            size_bytes,
        })
    }

    /// Delete `bucket/file`: metadata first, then one physical delete per
    /// chunk in sequence. Stops at the first shard failure.
    pub async fn delete_file(&self, bucket: &str, file: &str) -> GatewayResult<Vec<ChunkPlacement>> {
        validate_name("bucket", bucket)?;
        validate_name("file", file)?;

        let chunks = self.meta.delete_file(bucket, file).await?;

        for (idx, chunk) in chunks.iter().enumerate() {
            let result = match self.shards.get(&chunk.shard) {
                Some(shard) => self.shard_client.delete_chunk(shard, &chunk.chunk_name).await,
                None => Err(ShardError::UnknownShard(chunk.shard.clone())),
            };
            if let Err(source) = result {
                warn!(
                    bucket, file, chunk = %chunk.chunk_name, shard = %chunk.shard,
                    orphaned = chunks.len() - idx,
                    "chunk delete failed after metadata was removed"
                );
                return Err(GatewayError::Shard {
                    op: ShardOp::Delete,
                    bucket: bucket.to_string(),
                    file: file.to_string(),
                    chunk: chunk.chunk_name.clone(),
                    source,
                });
            }
        }

        info!(bucket, file, chunks = chunks.len(), "deleted file");
        Ok(chunks)
    }

    /// Read `bucket/file` by concatenating its chunks in persisted order.
    pub async fn read_file(&self, bucket: &str, file: &str) -> GatewayResult<FileContents> {
        validate_name("bucket", bucket)?;
        validate_name("file", file)?;

        let resolved = self.meta.resolve_file(bucket, file).await?;

        let mut data = BytesMut::new();
        for chunk in &resolved.chunks {
            let result = match self.shards.get(&chunk.shard) {
                Some(shard) => self.shard_client.get_chunk(shard, &chunk.chunk_name).await,
                None => Err(ShardError::UnknownShard(chunk.shard.clone())),
            };
            let bytes = result.map_err(|source| GatewayError::Shard {
                op: ShardOp::Read,
                bucket: bucket.to_string(),
                file: file.to_string(),
                chunk: chunk.chunk_name.clone(),
                source,
            })?;
            data.extend_from_slice(&bytes);
        }

        debug!(bucket, file, chunks = resolved.chunks.len(), bytes = data.len(), "read file");
        Ok(FileContents {
            content_type: resolved.content_type,
            data: data.freeze(),
        })
    }
}

/// Read up to `size` bytes into a fresh buffer. The returned window holds
/// exactly the bytes read and is shorter than `size` only at end of stream.
async fn read_window<R>(reader: &mut R, size: usize) -> io::Result<Bytes>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut window = Vec::with_capacity(size);
    reader.take(size as u64).read_to_end(&mut window).await?;
    Ok(Bytes::from(window))
}
