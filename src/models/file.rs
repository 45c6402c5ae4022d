//! Represents a file stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A file row in the metadata store.
///
/// The row carries metadata only. File bytes live on the shards, split into
/// chunks recorded in the `chunks` table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct FileRecord {
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// File name, unique within its bucket.
    pub name: String,

    /// Content type supplied at upload time and echoed on reads.
    pub content_type: String,

    pub created_at: DateTime<Utc>,
}
