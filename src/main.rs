use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{AppConfig, Role},
    handlers::stats_handlers::StatsState,
    services::{
        gateway_service::GatewayService, meta_client::MetaClient,
        metadata_service::MetadataStore, shard_client::ShardClient,
        storage_service::StorageService,
    },
};

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + role ---
    let (cfg, role) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting shardstore {:?} with config: {:?}", role, cfg);

    match role {
        Role::Meta { migrate } => run_meta(&cfg, migrate).await,
        Role::Shard { name } => run_shard(&cfg, &name).await,
        Role::Gateway => run_gateway(&cfg).await,
        Role::Stats => run_stats(&cfg).await,
    }
}

async fn run_meta(cfg: &AppConfig, migrate: bool) -> Result<()> {
    // --- Initialize SQLite connection ---
    let db_url = &cfg.cluster.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    let store = MetadataStore::new(db);
    store.migrate().await?;
    tracing::info!("Database migration complete.");

    // --- Handle migration mode ---
    if migrate {
        return Ok(()); // exit after migration
    }

    let app: Router = routes::routes::meta_routes().with_state(store);
    serve(cfg, cfg.cluster.meta_port, app).await
}

async fn run_shard(cfg: &AppConfig, name: &str) -> Result<()> {
    let port = cfg.shard_port(name)?;
    let storage = StorageService::new(name, cfg.shard_dir(name));
    storage.init().await?;
    tracing::info!(
        "Shard {} storing chunks under {}",
        name,
        storage.base_path.display()
    );

    let app: Router = routes::routes::shard_routes().with_state(storage);
    serve(cfg, port, app).await
}

async fn run_gateway(cfg: &AppConfig) -> Result<()> {
    let shards = Arc::new(cfg.shard_set()?);
    let meta = Arc::new(MetaClient::new(cfg.meta_url(), cfg.request_timeout())?);
    let shard_client = ShardClient::new(cfg.request_timeout())?;

    tracing::info!(
        "Gateway using metadata authority at {} and {} shards",
        cfg.meta_url(),
        shards.len()
    );
    for shard in shards.iter() {
        tracing::debug!("Placement shard {}", shard);
    }

    let gateway = GatewayService::new(meta, shards, shard_client, cfg.cluster.chunk_size);
    let app: Router = routes::routes::gateway_routes().with_state(gateway);
    serve(cfg, cfg.cluster.api_port, app).await
}

async fn run_stats(cfg: &AppConfig) -> Result<()> {
    let state = StatsState {
        shards: Arc::new(cfg.shard_set()?),
        client: ShardClient::new(cfg.request_timeout())?,
    };
    let app: Router = routes::routes::stats_routes().with_state(state);
    serve(cfg, cfg.cluster.stat_port, app).await
}

/// Bind `host:port` and serve `app` until the process stops.
async fn serve(cfg: &AppConfig, port: u16, app: Router) -> Result<()> {
    let addr = cfg.addr(port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
