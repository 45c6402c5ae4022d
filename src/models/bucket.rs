//! Represents a logical bucket, the namespace files live in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A bucket row in the metadata store.
///
/// Buckets are first-class rows: a bucket exists exactly when its row exists,
/// independent of how many files it holds.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal identifier referenced by `files.bucket_id`.
    pub id: Uuid,

    /// Unique bucket name. Never contains the chunk-name delimiter.
    pub name: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
