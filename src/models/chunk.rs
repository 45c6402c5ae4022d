//! Chunk placement records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Where one chunk of a file lives. This is the unit exchanged between the
/// gateway and the metadata authority; list position is the sequence number.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChunkPlacement {
    pub chunk_name: String,
    pub shard: String,
}

impl ChunkPlacement {
    pub fn new(chunk_name: impl Into<String>, shard: impl Into<String>) -> Self {
        Self {
            chunk_name: chunk_name.into(),
            shard: shard.into(),
        }
    }
}

/// A persisted chunk row. `seq` is explicit so ordering never depends on
/// the order rows come back from the store.
#[derive(Clone, FromRow, Debug)]
pub struct ChunkRecord {
    pub seq: i64,
    pub chunk_name: String,
    pub shard: String,
}

impl From<ChunkRecord> for ChunkPlacement {
    fn from(record: ChunkRecord) -> Self {
        Self {
            chunk_name: record.chunk_name,
            shard: record.shard,
        }
    }
}

/// A file resolved to its content type and ordered chunk list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedFile {
    pub content_type: String,
    pub chunks: Vec<ChunkPlacement>,
}
