//! Statistics proxy: forwards one shard's chunk listing.

use crate::{
    errors::AppError,
    services::{placement::ShardSet, shard_client::ShardClient},
};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct StatsState {
    pub shards: Arc<ShardSet>,
    pub client: ShardClient,
}

/// GET `/stat/shard/{shard}`
pub async fn get_shard_stats(
    State(state): State<StatsState>,
    Path(shard): Path<String>,
) -> Result<Response, AppError> {
    let Some(target) = state.shards.get(&shard) else {
        return Err(AppError::bad_request(format!("Unknown shard {}", shard)));
    };

    let (status, body) = state.client.fetch_stats(target).await?;
    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}
