//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok"), every role
//! - GET /readyz   -> readiness; the meta role checks SQLite, a shard checks
//!   disk I/O under its data directory

use crate::services::{metadata_service::MetadataStore, storage_service::StorageService};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Very small liveness probe: always returns 200 OK with a plain JSON body.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz` on the meta role: runs `SELECT 1` against SQLite.
pub async fn meta_readyz(State(store): State<MetadataStore>) -> impl IntoResponse {
    let check = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*store.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };
    ready_response(HashMap::from([("sqlite", check)]))
}

/// `GET /readyz` on a shard: best-effort write/read/delete of a temp file
/// in the shard's data directory.
pub async fn shard_readyz(State(storage): State<StorageService>) -> impl IntoResponse {
    let tmp_path = storage
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) if bytes == b"readyz" => match fs::remove_file(&tmp_path).await {
                Ok(_) => CheckStatus::ok(),
                Err(e) => CheckStatus {
                    ok: true,
                    error: Some(format!("could not remove tmp file: {}", e)),
                },
            },
            Ok(_) => {
                let _ = fs::remove_file(&tmp_path).await;
                CheckStatus::failed("file content mismatch".to_string())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                CheckStatus::failed(format!("could not read tmp file: {}", e))
            }
        },
        Err(e) => CheckStatus::failed(format!("could not write tmp file: {}", e)),
    };
    ready_response(HashMap::from([("disk", check)]))
}

fn ready_response(checks: HashMap<&'static str, CheckStatus>) -> impl IntoResponse {
    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        routes::routes::meta_routes,
        services::{
            gateway_service::tests::{spawn_router, spawn_shard},
            metadata_service::tests::test_store,
        },
    };
    use reqwest::StatusCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn meta_and_shard_report_ready() {
        let dir = TempDir::new().unwrap();
        let (meta_addr, _) = spawn_router(meta_routes().with_state(test_store(&dir).await)).await;
        let shard = spawn_shard(&dir, "s1").await;
        let http = reqwest::Client::new();

        for base in [format!("http://{meta_addr}"), shard.shard.base_url()] {
            for path in ["healthz", "readyz"] {
                let resp = http.get(format!("{base}/{path}")).send().await.unwrap();
                assert_eq!(resp.status(), StatusCode::OK, "{base}/{path}");
                let body: serde_json::Value = resp.json().await.unwrap();
                assert_eq!(body["status"], "ok");
            }
        }

        let stats: serde_json::Value = http
            .get(format!("{}/stats/get", shard.shard.base_url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["chunk_count"], 0);
    }
}
