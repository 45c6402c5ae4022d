//! Remote [`MetaAuthority`] speaking the meta role's JSON RPC.

use crate::{
    models::chunk::{ChunkPlacement, ResolvedFile},
    services::meta_authority::{
        BucketReq, CreateFileReq, DeleteFileResp, FileReq, ListFilesResp, MetaAuthority,
        MetaError, MetaResult, RpcError,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct MetaClient {
    http: Client,
    base_url: String,
}

impl MetaClient {
    /// `base_url` is the meta role's root, e.g. `http://meta:50051`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn call<Req, Resp>(&self, method: &str, req: &Req) -> MetaResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/rpc/{}", self.base_url, method);
        let resp = self.http.post(&url).json(req).send().await.map_err(|err| {
            warn!(error = %err, method, "metadata authority unreachable");
            MetaError::Unavailable(format!("metadata authority unreachable during {}", method))
        })?;

        let status = resp.status();
        if status.is_success() {
            return resp.json::<Resp>().await.map_err(|err| {
                MetaError::Internal(format!("malformed {} response: {}", method, err))
            });
        }

        let body = resp.bytes().await.unwrap_or_default();
        match serde_json::from_slice::<RpcError>(&body) {
            Ok(rpc_err) => Err(rpc_err.into()),
            Err(_) => Err(MetaError::Internal(format!(
                "{} failed with status {}: {}",
                method,
                status,
                String::from_utf8_lossy(&body)
            ))),
        }
    }
}

/// Empty JSON object returned by operations without a payload.
#[derive(serde::Deserialize)]
struct Ack {}

#[async_trait]
impl MetaAuthority for MetaClient {
    async fn create_bucket(&self, bucket: &str) -> MetaResult<()> {
        let req = BucketReq {
            bucket: bucket.to_string(),
        };
        self.call::<_, Ack>("create_bucket", &req).await.map(|_| ())
    }

    async fn delete_bucket(&self, bucket: &str) -> MetaResult<()> {
        let req = BucketReq {
            bucket: bucket.to_string(),
        };
        self.call::<_, Ack>("delete_bucket", &req).await.map(|_| ())
    }

    async fn list_files(&self, bucket: &str) -> MetaResult<Vec<String>> {
        let req = BucketReq {
            bucket: bucket.to_string(),
        };
        let resp: ListFilesResp = self.call("list_files", &req).await?;
        Ok(resp.files)
    }

    async fn create_file(
        &self,
        bucket: &str,
        file: &str,
        content_type: &str,
        chunks: &[ChunkPlacement],
    ) -> MetaResult<()> {
        let req = CreateFileReq {
            bucket: bucket.to_string(),
            file: file.to_string(),
            content_type: content_type.to_string(),
            chunks: chunks.to_vec(),
        };
        self.call::<_, Ack>("create_file", &req).await.map(|_| ())
    }

    async fn delete_file(&self, bucket: &str, file: &str) -> MetaResult<Vec<ChunkPlacement>> {
        let req = FileReq {
            bucket: bucket.to_string(),
            file: file.to_string(),
        };
        let resp: DeleteFileResp = self.call("delete_file", &req).await?;
        Ok(resp.chunks)
    }

    async fn resolve_file(&self, bucket: &str, file: &str) -> MetaResult<ResolvedFile> {
        let req = FileReq {
            bucket: bucket.to_string(),
            file: file.to_string(),
        };
        self.call("resolve_file", &req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::routes::meta_routes,
        services::{
            gateway_service::tests::{dead_port, spawn_router},
            meta_authority::ErrorKind,
            metadata_service::tests::test_store,
        },
    };
    use tempfile::TempDir;

    async fn client(dir: &TempDir) -> MetaClient {
        let store = test_store(dir).await;
        let (addr, _) = spawn_router(meta_routes().with_state(store)).await;
        MetaClient::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn operations_round_trip_over_rpc() {
        let dir = TempDir::new().unwrap();
        let meta = client(&dir).await;

        meta.create_bucket("b").await.unwrap();
        let chunks = vec![
            ChunkPlacement::new("b_0_f", "s2"),
            ChunkPlacement::new("b_1_f", "s1"),
        ];
        meta.create_file("b", "f", "text/plain", &chunks).await.unwrap();

        assert_eq!(meta.list_files("b").await.unwrap(), vec!["f".to_string()]);
        let resolved = meta.resolve_file("b", "f").await.unwrap();
        assert_eq!(resolved.content_type, "text/plain");
        assert_eq!(resolved.chunks, chunks);

        assert_eq!(meta.delete_file("b", "f").await.unwrap(), chunks);
        meta.delete_bucket("b").await.unwrap();
    }

    #[tokio::test]
    async fn error_kinds_survive_the_wire() {
        let dir = TempDir::new().unwrap();
        let meta = client(&dir).await;
        meta.create_bucket("b").await.unwrap();
        meta.create_file("b", "f", "text/plain", &[]).await.unwrap();

        let cases = [
            (meta.create_bucket("a_b").await.unwrap_err(), ErrorKind::InvalidArgument),
            (meta.list_files("nope").await.unwrap_err(), ErrorKind::NotFound),
            (meta.create_bucket("b").await.unwrap_err(), ErrorKind::AlreadyExists),
            (meta.delete_bucket("b").await.unwrap_err(), ErrorKind::FailedPrecondition),
            (meta.resolve_file("b", "g").await.unwrap_err(), ErrorKind::NotFound),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[tokio::test]
    async fn commits_chunk_lists_larger_than_the_default_body_limit() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir).await;
        let (addr, _) = spawn_router(meta_routes().with_state(store)).await;
        let meta = MetaClient::new(format!("http://{addr}"), Duration::from_secs(120)).unwrap();
        meta.create_bucket("photos").await.unwrap();

        let chunks: Vec<ChunkPlacement> = (0..50_000)
            .map(|seq| {
                ChunkPlacement::new(
                    crate::services::naming::chunk_name("photos", "vacation.mp4", seq),
                    if seq % 2 == 0 { "s1" } else { "s2" },
                )
            })
            .collect();
        assert!(serde_json::to_vec(&chunks).unwrap().len() > 2 * 1024 * 1024);

        meta.create_file("photos", "vacation.mp4", "video/mp4", &chunks)
            .await
            .unwrap();

        let resolved = meta.resolve_file("photos", "vacation.mp4").await.unwrap();
        assert_eq!(resolved.chunks.len(), 50_000);
        assert_eq!(resolved.chunks, chunks);
    }

    #[tokio::test]
    async fn unreachable_authority_is_unavailable() {
        let port = dead_port().await;
        let meta =
            MetaClient::new(format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();

        let err = meta.create_bucket("b").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
