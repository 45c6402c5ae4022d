//! The metadata authority boundary.
//!
//! [`MetaAuthority`] is the six-operation contract the gateway depends on.
//! It is implemented locally by [`MetadataStore`] and remotely by
//! [`MetaClient`], which speaks the JSON RPC served by the meta role.
//!
//! [`MetadataStore`]: crate::services::metadata_service::MetadataStore
//! [`MetaClient`]: crate::services::meta_client::MetaClient

use crate::models::chunk::{ChunkPlacement, ResolvedFile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification shared by every layer that talks to the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unavailable,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type MetaResult<T> = Result<T, MetaError>;

impl MetaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MetaError::NotFound(_) => ErrorKind::NotFound,
            MetaError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            MetaError::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            MetaError::Unavailable(_) => ErrorKind::Unavailable,
            MetaError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            MetaError::InvalidArgument(msg)
            | MetaError::NotFound(msg)
            | MetaError::AlreadyExists(msg)
            | MetaError::FailedPrecondition(msg)
            | MetaError::Unavailable(msg)
            | MetaError::Internal(msg) => msg,
        }
    }

    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidArgument => MetaError::InvalidArgument(message),
            ErrorKind::NotFound => MetaError::NotFound(message),
            ErrorKind::AlreadyExists => MetaError::AlreadyExists(message),
            ErrorKind::FailedPrecondition => MetaError::FailedPrecondition(message),
            ErrorKind::Unavailable => MetaError::Unavailable(message),
            ErrorKind::Internal => MetaError::Internal(message),
        }
    }
}

/// Transactional system of record for buckets, files and chunk placement.
///
/// Every operation is atomic with respect to concurrent callers.
#[async_trait]
pub trait MetaAuthority: Send + Sync {
    /// Record a new bucket. `AlreadyExists` if the name is taken.
    async fn create_bucket(&self, bucket: &str) -> MetaResult<()>;

    /// Remove an empty bucket. `NotFound` if unknown, `FailedPrecondition`
    /// if it still holds files.
    async fn delete_bucket(&self, bucket: &str) -> MetaResult<()>;

    async fn list_files(&self, bucket: &str) -> MetaResult<Vec<String>>;

    /// Insert a file and all its chunk rows at once. The position of each
    /// chunk in `chunks` becomes its persisted sequence number.
    async fn create_file(
        &self,
        bucket: &str,
        file: &str,
        content_type: &str,
        chunks: &[ChunkPlacement],
    ) -> MetaResult<()>;

    /// Delete a file and its chunk rows, returning the chunk list as it was
    /// right before deletion, in sequence order.
    async fn delete_file(&self, bucket: &str, file: &str) -> MetaResult<Vec<ChunkPlacement>>;

    async fn resolve_file(&self, bucket: &str, file: &str) -> MetaResult<ResolvedFile>;
}

// --- RPC wire types ---

#[derive(Serialize, Deserialize, Debug)]
pub struct BucketReq {
    pub bucket: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct FileReq {
    pub bucket: String,
    pub file: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateFileReq {
    pub bucket: String,
    pub file: String,
    pub content_type: String,
    pub chunks: Vec<ChunkPlacement>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListFilesResp {
    pub files: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DeleteFileResp {
    pub chunks: Vec<ChunkPlacement>,
}

/// Error body returned by the meta RPC server.
#[derive(Serialize, Deserialize, Debug)]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MetaError> for RpcError {
    fn from(err: &MetaError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

impl From<RpcError> for MetaError {
    fn from(err: RpcError) -> Self {
        MetaError::from_kind(err.kind, err.message)
    }
}
