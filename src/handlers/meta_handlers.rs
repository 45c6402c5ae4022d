//! JSON RPC handlers for the metadata authority.
//!
//! One POST endpoint per operation under `/rpc/`. Failures are returned as
//! `RpcFailure`, which carries the error kind so the remote client can
//! rebuild the same `MetaError`.

use crate::{
    errors::RpcFailure,
    models::chunk::ResolvedFile,
    services::{
        meta_authority::{
            BucketReq, CreateFileReq, DeleteFileResp, FileReq, ListFilesResp, MetaAuthority,
        },
        metadata_service::MetadataStore,
    },
};
use axum::{Json, extract::State};
use serde_json::{Value, json};

pub async fn create_bucket(
    State(store): State<MetadataStore>,
    Json(req): Json<BucketReq>,
) -> Result<Json<Value>, RpcFailure> {
    store.create_bucket(&req.bucket).await?;
    Ok(Json(json!({})))
}

pub async fn delete_bucket(
    State(store): State<MetadataStore>,
    Json(req): Json<BucketReq>,
) -> Result<Json<Value>, RpcFailure> {
    store.delete_bucket(&req.bucket).await?;
    Ok(Json(json!({})))
}

pub async fn list_files(
    State(store): State<MetadataStore>,
    Json(req): Json<BucketReq>,
) -> Result<Json<ListFilesResp>, RpcFailure> {
    let files = store.list_files(&req.bucket).await?;
    Ok(Json(ListFilesResp { files }))
}

pub async fn create_file(
    State(store): State<MetadataStore>,
    Json(req): Json<CreateFileReq>,
) -> Result<Json<Value>, RpcFailure> {
    store
        .create_file(&req.bucket, &req.file, &req.content_type, &req.chunks)
        .await?;
    Ok(Json(json!({})))
}

pub async fn delete_file(
    State(store): State<MetadataStore>,
    Json(req): Json<FileReq>,
) -> Result<Json<DeleteFileResp>, RpcFailure> {
    let chunks = store.delete_file(&req.bucket, &req.file).await?;
    Ok(Json(DeleteFileResp { chunks }))
}

pub async fn resolve_file(
    State(store): State<MetadataStore>,
    Json(req): Json<FileReq>,
) -> Result<Json<ResolvedFile>, RpcFailure> {
    Ok(Json(store.resolve_file(&req.bucket, &req.file).await?))
}
