//! HTTP client for the shard blob endpoints.
//!
//! Every call carries the configured request timeout, and idle connections
//! are not pooled, so a slow shard only holds up the request talking to it.

use crate::services::placement::Shard;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ShardError {
    /// Connection refused, reset or timed out.
    #[error("shard `{shard}` unreachable: {source}")]
    Unreachable {
        shard: String,
        #[source]
        source: reqwest::Error,
    },
    /// The shard answered with a non-success status.
    #[error("shard `{shard}` answered {status}: {body}")]
    Status {
        shard: String,
        status: StatusCode,
        body: String,
    },
    #[error("shard `{0}` is not part of the configured shard set")]
    UnknownShard(String),
    #[error("failed to build shard client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ShardError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ShardError::Unreachable { .. })
    }
}

pub type ShardResult<T> = Result<T, ShardError>;

#[derive(Clone)]
pub struct ShardClient {
    http: Client,
}

impl ShardClient {
    pub fn new(timeout: Duration) -> ShardResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(ShardError::Client)?;
        Ok(Self { http })
    }

    fn chunk_url(shard: &Shard, chunk_name: &str) -> String {
        format!("{}/{}", shard.base_url(), chunk_name)
    }

    /// `POST /{chunk_name}` with the raw chunk bytes.
    pub async fn put_chunk(&self, shard: &Shard, chunk_name: &str, data: Bytes) -> ShardResult<()> {
        let len = data.len();
        let resp = self
            .http
            .post(Self::chunk_url(shard, chunk_name))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|source| unreachable(shard, source))?;
        check_status(shard, resp).await?;
        debug!(shard = %shard.name, chunk = chunk_name, bytes = len, "chunk stored");
        Ok(())
    }

    /// `GET /{chunk_name}`.
    pub async fn get_chunk(&self, shard: &Shard, chunk_name: &str) -> ShardResult<Bytes> {
        let resp = self
            .http
            .get(Self::chunk_url(shard, chunk_name))
            .send()
            .await
            .map_err(|source| unreachable(shard, source))?;
        let resp = check_status(shard, resp).await?;
        resp.bytes()
            .await
            .map_err(|source| unreachable(shard, source))
    }

    /// `DELETE /{chunk_name}`.
    pub async fn delete_chunk(&self, shard: &Shard, chunk_name: &str) -> ShardResult<()> {
        let resp = self
            .http
            .delete(Self::chunk_url(shard, chunk_name))
            .send()
            .await
            .map_err(|source| unreachable(shard, source))?;
        check_status(shard, resp).await?;
        debug!(shard = %shard.name, chunk = chunk_name, "chunk removed");
        Ok(())
    }

    /// `GET /stats/get`, returned as-is together with the shard's status.
    pub async fn fetch_stats(&self, shard: &Shard) -> ShardResult<(StatusCode, Bytes)> {
        let resp = self
            .http
            .get(format!("{}/stats/get", shard.base_url()))
            .send()
            .await
            .map_err(|source| unreachable(shard, source))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|source| unreachable(shard, source))?;
        Ok((status, body))
    }
}

fn unreachable(shard: &Shard, source: reqwest::Error) -> ShardError {
    ShardError::Unreachable {
        shard: shard.name.clone(),
        source,
    }
}

async fn check_status(shard: &Shard, resp: reqwest::Response) -> ShardResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ShardError::Status {
        shard: shard.name.clone(),
        status,
        body: body.trim().to_string(),
    })
}
