//! Blob endpoints served by a storage shard.

use crate::{
    errors::AppError,
    services::storage_service::{ShardStats, StorageService},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// POST `/{chunk}`: store the request body under the chunk name.
pub async fn put_chunk(
    State(storage): State<StorageService>,
    Path(chunk): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    storage.put_chunk(&chunk, body).await?;
    Ok(StatusCode::CREATED)
}

/// GET `/{chunk}`: raw bytes; 500 when the chunk is absent.
pub async fn get_chunk(
    State(storage): State<StorageService>,
    Path(chunk): Path<String>,
) -> Result<Response, AppError> {
    let data = storage.get_chunk(&chunk).await?;
    let mut response = data.into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}

/// DELETE `/{chunk}`: 500 when the chunk is absent.
pub async fn delete_chunk(
    State(storage): State<StorageService>,
    Path(chunk): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    storage.delete_chunk(&chunk).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/stats/get`: chunk listing for this shard.
pub async fn get_stats(State(storage): State<StorageService>) -> Result<Json<ShardStats>, AppError> {
    Ok(Json(storage.stats().await?))
}

#[cfg(test)]
mod tests {
    use crate::services::{
        gateway_service::tests::spawn_shard, placement::Shard, shard_client::ShardClient,
        shard_client::ShardError,
    };
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn blob_round_trip_and_missing_chunks() {
        let dir = TempDir::new().unwrap();
        let running = spawn_shard(&dir, "s1").await;
        let client = ShardClient::new(Duration::from_secs(5)).unwrap();
        let shard = &running.shard;

        client
            .put_chunk(shard, "b_0_f", Bytes::from_static(b"abcd"))
            .await
            .unwrap();
        assert_eq!(client.get_chunk(shard, "b_0_f").await.unwrap(), &b"abcd"[..]);

        let (status, body) = client.fetch_stats(shard).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["chunk_count"], 1);
        assert_eq!(stats["chunks"][0]["name"], "b_0_f");

        client.delete_chunk(shard, "b_0_f").await.unwrap();
        for err in [
            client.get_chunk(shard, "b_0_f").await.unwrap_err(),
            client.delete_chunk(shard, "b_0_f").await.unwrap_err(),
        ] {
            match err {
                ShardError::Status { status, .. } => {
                    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn unreachable_shard_is_unavailable() {
        let port = crate::services::gateway_service::tests::dead_port().await;
        let client = ShardClient::new(Duration::from_secs(5)).unwrap();
        let err = client
            .get_chunk(&Shard::new("down", "127.0.0.1", port), "b_0_f")
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
