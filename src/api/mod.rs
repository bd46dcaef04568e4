//! HTTP/WS surface for the optimizer backend.

pub mod lut;
pub mod optimizer;
pub mod stream;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::error::OptimizerError;
use crate::lut::distribution::DistributionCache;
use crate::lut::Loader;
use crate::watcher::FileWatcher;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub loader: Arc<Loader>,
    pub distributions: Arc<DistributionCache>,
    pub watcher: Option<Arc<FileWatcher>>,
}

/// Build the full API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/modes", get(lut::get_modes))
        .route("/api/lut/:mode/distribution", get(lut::get_distribution))
        .route("/api/watcher/enabled", post(lut::post_watcher_enabled))
        .route(
            "/api/optimizer/:mode/analyze",
            get(optimizer::get_analyze_mode),
        )
        .route(
            "/api/optimizer/:mode/suggest-buckets",
            get(optimizer::get_suggest_buckets),
        )
        .route(
            "/api/optimizer/:mode/bucket-optimize",
            post(optimizer::post_bucket_optimize),
        )
        .route(
            "/api/optimizer/:mode/optimize-stream",
            get(stream::get_optimize_stream),
        )
        .route("/api/optimizer/:mode/apply", post(optimizer::post_apply))
        .route("/api/optimizer/:mode/backups", get(optimizer::get_backups))
        .route("/api/optimizer/:mode/restore", post(optimizer::post_restore))
        .route(
            "/api/optimizer/bucket-presets",
            get(optimizer::get_bucket_presets),
        )
        .route("/api/optimizer/profiles", get(optimizer::get_profiles))
        .route(
            "/api/optimizer/generate-configs",
            get(optimizer::get_generate_configs),
        )
        .route(
            "/api/optimizer/generate-config",
            post(optimizer::post_generate_config),
        )
        .route(
            "/api/optimizer/:mode/generate-configs",
            get(optimizer::get_generate_configs_for_mode),
        )
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Wire error wrapper: maps domain errors onto status codes.
#[derive(Debug)]
pub enum ApiError {
    Domain(OptimizerError),
    Internal(anyhow::Error),
}

impl From<OptimizerError> for ApiError {
    fn from(err: OptimizerError) -> Self {
        ApiError::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Domain(err) => {
                let status = match err {
                    OptimizerError::InvalidBuckets(_) | OptimizerError::InvalidRequest(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    OptimizerError::ModeNotFound(_) => StatusCode::NOT_FOUND,
                    OptimizerError::EmptyTable | OptimizerError::NoWinners => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    OptimizerError::InvalidCsv { .. }
                    | OptimizerError::SaveFailed(_)
                    | OptimizerError::Cancelled => {
                        tracing::error!(error = %err, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_status_mapping() {
        let cases = [
            (
                OptimizerError::InvalidBuckets("gap".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                OptimizerError::InvalidRequest("target_rtp".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                OptimizerError::ModeNotFound("ghost".into()),
                StatusCode::NOT_FOUND,
            ),
            (OptimizerError::EmptyTable, StatusCode::UNPROCESSABLE_ENTITY),
            (OptimizerError::NoWinners, StatusCode::UNPROCESSABLE_ENTITY),
            (
                OptimizerError::InvalidCsv {
                    line: 3,
                    reason: "bad".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::Domain(err).into_response();
            assert_eq!(response.status(), expected);
        }

        let internal = ApiError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
