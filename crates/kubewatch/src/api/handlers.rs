use poem::handler;
use poem::http::StatusCode;
use poem::web::Json;
use serde_json::json;
use serde_json::Value;
use tracing::error;
use utils::version;

use super::errors::ApiError;
use crate::infrastructure::metrics;

/// Prometheus text exposition of the process registry
#[handler]
pub async fn get_metrics() -> poem::Result<String> {
    metrics::encode().map_err(|e| {
        let err = ApiError::MetricsEncoding {
            message: e.to_string(),
        };
        error!("{err}");
        poem::Error::from_string(err.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    })
}

/// Liveness probe
#[handler]
pub async fn get_health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Build information of the running binary
#[handler]
pub async fn get_version() -> Json<Value> {
    Json(json!({
        "version": &*version::VERSION,
        "image": version::IMAGE_VERSION,
        "gitSha": version::GIT_SHA,
        "dirty": version::is_dirty_build(),
    }))
}
