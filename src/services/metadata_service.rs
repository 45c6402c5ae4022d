//! src/services/metadata_service.rs
//!
//! MetadataStore: the SQLite-backed metadata authority. Buckets, files and
//! chunk placement live in three tables (see `migrations/0001_init.sql`).
//!
//! Existence checks and inserts are never split into a read followed by a
//! separate write. Duplicate creates are stopped by UNIQUE constraints, and
//! every multi-statement operation starts its transaction with a write so
//! SQLite takes the write lock up front.

use crate::{
    models::{
        bucket::Bucket,
        chunk::{ChunkPlacement, ChunkRecord, ResolvedFile},
        file::FileRecord,
    },
    services::{
        meta_authority::{MetaAuthority, MetaError, MetaResult},
        naming::validate_name,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct MetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl MetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is `IF NOT EXISTS`, so
    /// running it against an initialised database is a no-op.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetaAuthority for MetadataStore {
    async fn create_bucket(&self, bucket: &str) -> MetaResult<()> {
        validate_name("bucket", bucket)?;

        match sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(bucket)
            .bind(Utc::now())
            .execute(&*self.db)
            .await
        {
            Ok(_) => {
                debug!(bucket, "bucket recorded");
                Ok(())
            }
            Err(err) if is_unique_violation(&err) => Err(MetaError::AlreadyExists(format!(
                "bucket with name {} already exists",
                bucket
            ))),
            Err(err) => Err(classify(
                err,
                format!("failed to insert bucket {}", bucket),
            )),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> MetaResult<()> {
        validate_name("bucket", bucket)?;
        let ctx = |what: &str| format!("failed to {} while deleting bucket {}", what, bucket);

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|err| classify(err, ctx("begin tx")))?;

        let deleted = sqlx::query(
            "DELETE FROM buckets WHERE name = ?
             AND NOT EXISTS (SELECT 1 FROM files WHERE files.bucket_id = buckets.id)",
        )
        .bind(bucket)
        .execute(&mut *tx)
        .await
        .map_err(|err| classify(err, ctx("run DELETE")))?
        .rows_affected();

        if deleted == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM buckets WHERE name = ?")
                .bind(bucket)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| classify(err, ctx("check existence")))?;
            return Err(match exists {
                Some(_) => MetaError::FailedPrecondition(format!(
                    "bucket {} is not empty before deleting",
                    bucket
                )),
                None => MetaError::NotFound(format!("bucket with name {} does not exist", bucket)),
            });
        }

        tx.commit()
            .await
            .map_err(|err| classify(err, ctx("commit tx")))?;
        debug!(bucket, "bucket removed");
        Ok(())
    }

    async fn list_files(&self, bucket: &str) -> MetaResult<Vec<String>> {
        validate_name("bucket", bucket)?;
        let ctx = |what: &str| {
            format!(
                "failed to {} while getting list of files from bucket {}",
                what, bucket
            )
        };

        // One read transaction so the existence check and the listing see
        // the same snapshot.
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|err| classify(err, ctx("begin tx")))?;

        let record: Option<Bucket> =
            sqlx::query_as("SELECT id, name, created_at FROM buckets WHERE name = ?")
                .bind(bucket)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|err| classify(err, ctx("look up bucket")))?;
        let Some(record) = record else {
            return Err(MetaError::NotFound(format!(
                "bucket with name {} does not exist",
                bucket
            )));
        };

        let files: Vec<String> =
            sqlx::query_scalar("SELECT name FROM files WHERE bucket_id = ? ORDER BY name ASC")
                .bind(record.id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|err| classify(err, ctx("run SELECT")))?;

        tx.commit()
            .await
            .map_err(|err| classify(err, ctx("commit tx")))?;
        Ok(files)
    }

    async fn create_file(
        &self,
        bucket: &str,
        file: &str,
        content_type: &str,
        chunks: &[ChunkPlacement],
    ) -> MetaResult<()> {
        validate_name("bucket", bucket)?;
        validate_name("file", file)?;
        let ctx = |what: &str| {
            format!(
                "failed to {} while creating file {} in bucket {}",
                what, file, bucket
            )
        };

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|err| classify(err, ctx("begin tx")))?;

        // The bucket lookup is folded into the insert: no bucket row, no
        // file row, and the UNIQUE (bucket_id, name) constraint settles
        // concurrent duplicates.
        let inserted: Option<Uuid> = match sqlx::query_scalar(
            "INSERT INTO files (id, bucket_id, name, content_type, created_at)
             SELECT ?, id, ?, ?, ? FROM buckets WHERE name = ?
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(file)
        .bind(content_type)
        .bind(Utc::now())
        .bind(bucket)
        .fetch_optional(&mut *tx)
        .await
        {
            Ok(id) => id,
            Err(err) if is_unique_violation(&err) => {
                return Err(MetaError::AlreadyExists(format!(
                    "file with name {} already exists in bucket {}",
                    file, bucket
                )));
            }
            Err(err) => return Err(classify(err, ctx("insert row into files table"))),
        };
        let Some(file_id) = inserted else {
            return Err(MetaError::NotFound(format!(
                "bucket with name {} does not exist",
                bucket
            )));
        };

        for (seq, chunk) in chunks.iter().enumerate() {
            sqlx::query("INSERT INTO chunks (file_id, seq, chunk_name, shard) VALUES (?, ?, ?, ?)")
                .bind(file_id)
                .bind(seq as i64)
                .bind(&chunk.chunk_name)
                .bind(&chunk.shard)
                .execute(&mut *tx)
                .await
                .map_err(|err| classify(err, ctx("insert row into chunks table")))?;
        }

        tx.commit()
            .await
            .map_err(|err| classify(err, ctx("commit tx")))?;
        debug!(bucket, file, chunks = chunks.len(), "file recorded");
        Ok(())
    }

    async fn delete_file(&self, bucket: &str, file: &str) -> MetaResult<Vec<ChunkPlacement>> {
        validate_name("bucket", bucket)?;
        validate_name("file", file)?;
        let ctx = |what: &str| {
            format!(
                "failed to {} while deleting file {} in bucket {}",
                what, file, bucket
            )
        };

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|err| classify(err, ctx("begin tx")))?;

        // RETURNING order is unspecified, so rows are sorted by seq below.
        let mut removed: Vec<ChunkRecord> = sqlx::query_as(
            "DELETE FROM chunks WHERE file_id = (
                 SELECT f.id FROM files f JOIN buckets b ON b.id = f.bucket_id
                 WHERE b.name = ? AND f.name = ?)
             RETURNING seq, chunk_name, shard",
        )
        .bind(bucket)
        .bind(file)
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| classify(err, ctx("delete rows from chunks table")))?;

        let file_id: Option<Uuid> = sqlx::query_scalar(
            "DELETE FROM files WHERE name = ?
             AND bucket_id = (SELECT id FROM buckets WHERE name = ?)
             RETURNING id",
        )
        .bind(file)
        .bind(bucket)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| classify(err, ctx("delete row from files table")))?;

        if file_id.is_none() {
            return Err(MetaError::NotFound(format!(
                "bucket with name {} does not exist or file with name {} does not exist",
                bucket, file
            )));
        }

        tx.commit()
            .await
            .map_err(|err| classify(err, ctx("commit tx")))?;

        removed.sort_by_key(|c| c.seq);
        debug!(bucket, file, chunks = removed.len(), "file removed");
        Ok(removed.into_iter().map(ChunkPlacement::from).collect())
    }

    async fn resolve_file(&self, bucket: &str, file: &str) -> MetaResult<ResolvedFile> {
        validate_name("bucket", bucket)?;
        validate_name("file", file)?;
        let ctx = |what: &str| {
            format!(
                "failed to {} while getting chunks of file {} in bucket {}",
                what, file, bucket
            )
        };

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|err| classify(err, ctx("begin tx")))?;

        let record: Option<FileRecord> = sqlx::query_as(
            "SELECT f.id, f.bucket_id, f.name, f.content_type, f.created_at
             FROM files f JOIN buckets b ON b.id = f.bucket_id
             WHERE b.name = ? AND f.name = ?",
        )
        .bind(bucket)
        .bind(file)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| classify(err, ctx("look up file")))?;
        let Some(record) = record else {
            return Err(MetaError::NotFound(format!(
                "bucket with name {} does not exist or file with name {} does not exist",
                bucket, file
            )));
        };

        let chunks: Vec<ChunkRecord> = sqlx::query_as(
            "SELECT seq, chunk_name, shard FROM chunks WHERE file_id = ? ORDER BY seq ASC",
        )
        .bind(record.id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|err| classify(err, ctx("run SELECT on chunks table")))?;

        tx.commit()
            .await
            .map_err(|err| classify(err, ctx("commit tx")))?;

        Ok(ResolvedFile {
            content_type: record.content_type,
            chunks: chunks.into_iter().map(ChunkPlacement::from).collect(),
        })
    }
}

/// Map a storage failure onto an error kind. The raw sqlx error is logged
/// here and only `context` reaches the caller.
fn classify(err: sqlx::Error, context: String) -> MetaError {
    let unavailable = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            // SQLITE_BUSY / SQLITE_LOCKED, including extended codes
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    };

    if unavailable {
        warn!(error = %err, "{}", context);
        MetaError::Unavailable(context)
    } else {
        error!(error = %err, "{}", context);
        MetaError::Internal(context)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
