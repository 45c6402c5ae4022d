//! Routers for the four server roles.
//!
//! ## Gateway (client-facing)
//! - `POST   /{bucket}`        create bucket
//! - `GET    /{bucket}`        list files
//! - `DELETE /{bucket}`        delete an empty bucket
//! - `POST   /{bucket}/{file}` upload file (raw body)
//! - `GET    /{bucket}/{file}` download file
//! - `DELETE /{bucket}/{file}` delete file
//!
//! Health endpoints are left off the gateway: `/{bucket}` would shadow them.
//!
//! ## Meta
//! - `POST /rpc/{operation}` for each metadata operation
//! - `GET  /healthz`, `GET /readyz`
//!
//! ## Shard
//! - `POST | GET | DELETE /{chunk}`
//! - `GET  /stats/get`
//! - `GET  /healthz`, `GET /readyz`
//!
//! ## Stats
//! - `GET /stat/shard/{shard}`

use crate::{
    handlers::{
        gateway_handlers, health_handlers, meta_handlers, shard_handlers,
        stats_handlers::{self, StatsState},
    },
    services::{
        gateway_service::GatewayService, metadata_service::MetadataStore,
        storage_service::StorageService,
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

pub fn gateway_routes() -> Router<GatewayService> {
    Router::new()
        .route(
            "/{bucket}/{file}",
            post(gateway_handlers::create_file)
                .get(gateway_handlers::get_file)
                .delete(gateway_handlers::delete_file),
        )
        .route(
            "/{bucket}",
            post(gateway_handlers::create_bucket)
                .get(gateway_handlers::list_files)
                .delete(gateway_handlers::delete_bucket),
        )
        .layer(TraceLayer::new_for_http())
}

/// A `create_file` call carries the whole chunk list of a file, so the
/// default extractor limit is lifted here as well.
pub fn meta_routes() -> Router<MetadataStore> {
    Router::new()
        .route("/healthz", get(health_handlers::healthz))
        .route("/readyz", get(health_handlers::meta_readyz))
        .route("/rpc/create_bucket", post(meta_handlers::create_bucket))
        .route("/rpc/delete_bucket", post(meta_handlers::delete_bucket))
        .route("/rpc/list_files", post(meta_handlers::list_files))
        .route("/rpc/create_file", post(meta_handlers::create_file))
        .route("/rpc/delete_file", post(meta_handlers::delete_file))
        .route("/rpc/resolve_file", post(meta_handlers::resolve_file))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
}

/// Chunk bodies are sized by the configured chunk size, so the default
/// extractor limit is lifted.
pub fn shard_routes() -> Router<StorageService> {
    Router::new()
        .route("/healthz", get(health_handlers::healthz))
        .route("/readyz", get(health_handlers::shard_readyz))
        .route("/stats/get", get(shard_handlers::get_stats))
        .route(
            "/{chunk}",
            post(shard_handlers::put_chunk)
                .get(shard_handlers::get_chunk)
                .delete(shard_handlers::delete_chunk),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
}

pub fn stats_routes() -> Router<StatsState> {
    Router::new()
        .route("/stat/shard/{shard}", get(stats_handlers::get_shard_stats))
        .layer(TraceLayer::new_for_http())
}
