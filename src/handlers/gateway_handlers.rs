//! HTTP handlers for the public gateway surface.
//! Buckets and files only; all orchestration lives in `GatewayService`.

use crate::{errors::AppError, services::gateway_service::GatewayService};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Serialize, Deserialize, Debug)]
pub struct BucketResponse {
    pub bucket: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ListFilesResponse {
    pub bucket: String,
    pub files: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateFileResponse {
    pub bucket: String,
    pub file: String,
    pub chunks: usize,
    pub size_bytes: u64,
}

/// POST `/{bucket}`: create bucket.
pub async fn create_bucket(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.create_bucket(&bucket).await?;
    Ok((StatusCode::CREATED, Json(BucketResponse { bucket })))
}

/// DELETE `/{bucket}`: delete an empty bucket.
pub async fn delete_bucket(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_bucket(&bucket).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/{bucket}`: list file names.
pub async fn list_files(
    State(service): State<GatewayService>,
    Path(bucket): Path<String>,
) -> Result<Json<ListFilesResponse>, AppError> {
    let files = service.list_files(&bucket).await?;
    Ok(Json(ListFilesResponse { bucket, files }))
}

/// POST `/{bucket}/{file}`: upload a file. The request `Content-Type` is
/// stored and echoed on reads.
pub async fn create_file(
    State(service): State<GatewayService>,
    Path((bucket, file)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let summary = service
        .create_file(&bucket, &file, &content_type, stream)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateFileResponse {
            bucket,
            file,
            chunks: summary.chunks,
            size_bytes: summary.size_bytes,
        }),
    ))
}

/// GET `/{bucket}/{file}`: chunks concatenated in sequence order.
pub async fn get_file(
    State(service): State<GatewayService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let contents = service.read_file(&bucket, &file).await?;
    let len = contents.data.len();

    let mut response = Response::new(Body::from(contents.data));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&contents.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

/// DELETE `/{bucket}/{file}`.
pub async fn delete_file(
    State(service): State<GatewayService>,
    Path((bucket, file)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_file(&bucket, &file).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::routes::gateway_routes,
        services::gateway_service::tests::{harness, spawn_router},
    };
    use reqwest::Client;

    async fn gateway_url() -> (String, crate::services::gateway_service::tests::Harness) {
        let h = harness(4).await;
        let (addr, _) = spawn_router(gateway_routes().with_state(h.gateway.clone())).await;
        (format!("http://{addr}"), h)
    }

    #[tokio::test]
    async fn bucket_and_file_lifecycle_over_http() {
        let (url, _h) = gateway_url().await;
        let client = Client::new();

        let resp = client.post(format!("{url}/b")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let resp = client.post(format!("{url}/b")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

        let resp = client
            .post(format!("{url}/b/f"))
            .header("Content-Type", "image/png")
            .body("abcdefgh")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: CreateFileResponse = resp.json().await.unwrap();
        assert_eq!(created.chunks, 2);
        assert_eq!(created.size_bytes, 8);

        let resp = client.get(format!("{url}/b/f")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(resp.bytes().await.unwrap(), &b"abcdefgh"[..]);

        let listing: ListFilesResponse = client
            .get(format!("{url}/b"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listing.files, vec!["f".to_string()]);

        let resp = client.delete(format!("{url}/b")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);

        let resp = client.delete(format!("{url}/b/f")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = client.get(format!("{url}/b/f")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = client.delete(format!("{url}/b")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = client.get(format!("{url}/b")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn error_statuses() {
        let (url, _h) = gateway_url().await;
        let client = Client::new();

        let resp = client.post(format!("{url}/a_b")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], 400);

        let resp = client.delete(format!("{url}/ghost")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = client
            .post(format!("{url}/ghost/f"))
            .body("x")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        client.post(format!("{url}/b")).send().await.unwrap();
        client
            .post(format!("{url}/b/f"))
            .body("first")
            .send()
            .await
            .unwrap();
        let resp = client
            .post(format!("{url}/b/f"))
            .body("second")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn missing_content_type_defaults_to_octet_stream() {
        let (url, _h) = gateway_url().await;
        let client = Client::new();

        client.post(format!("{url}/b")).send().await.unwrap();
        client
            .post(format!("{url}/b/empty"))
            .send()
            .await
            .unwrap();

        let resp = client.get(format!("{url}/b/empty")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
        assert!(resp.bytes().await.unwrap().is_empty());
    }
}
