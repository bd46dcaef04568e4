//! Mode listing, distribution reads, and the watcher toggle.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::api::{ApiError, AppState};
use crate::error::OptimizerError;
use crate::lut::distribution::PayoutBucket;
use crate::model::LookupTable;
use crate::optimizer::suggest_buckets;

/// GET /api/modes
pub async fn get_modes(State(state): State<AppState>) -> Json<Value> {
    let modes: Vec<Value> = state
        .loader
        .modes()
        .into_iter()
        .map(|spec| match state.loader.get_mode(&spec.mode) {
            Ok(table) => json!({
                "mode": spec.mode,
                "filename": spec.filename,
                "cost": spec.cost,
                "outcome_count": table.outcomes.len(),
                "current_rtp": table.rtp(),
            }),
            Err(e) => {
                warn!(mode = %spec.mode, error = %e, "mode failed to load");
                json!({
                    "mode": spec.mode,
                    "filename": spec.filename,
                    "cost": spec.cost,
                    "error": e.to_string(),
                })
            }
        })
        .collect();

    Json(json!({ "modes": modes }))
}

/// Distribution grouping ranges for a table: the zero bucket plus the
/// suggested constraint ranges.
pub fn payout_buckets_for(table: &LookupTable) -> Vec<PayoutBucket> {
    let mut buckets = vec![PayoutBucket {
        range_start: 0.0,
        range_end: 0.0,
    }];
    buckets.extend(suggest_buckets(table, 0.97).into_iter().map(|b| PayoutBucket {
        range_start: b.min_payout,
        range_end: b.max_payout,
    }));
    buckets
}

#[derive(Debug, Deserialize)]
pub struct DistributionQuery {
    pub range_start: Option<f64>,
    pub range_end: Option<f64>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
}

/// GET /api/lut/:mode/distribution?range_start=&range_end=&offset=&limit=
///
/// Serves from the distribution cache. A cold mode kicks off background
/// generation and answers `{"generating": true}`; the client retries.
pub async fn get_distribution(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Query(query): Query<DistributionQuery>,
) -> Result<Json<Value>, ApiError> {
    let (Some(range_start), Some(range_end)) = (query.range_start, query.range_end) else {
        return Err(
            OptimizerError::InvalidRequest("range_start and range_end required".into()).into(),
        );
    };

    if let Some(response) =
        state
            .distributions
            .get_bucket_items(&mode, range_start, range_end, query.offset, query.limit)
    {
        return Ok(Json(json!(response)));
    }

    // Cache miss: trigger generation off the request path.
    let table = state.loader.get_mode(&mode)?;
    let buckets = payout_buckets_for(&table);
    state
        .distributions
        .clone()
        .generate_async(&mode, table, buckets);

    Ok(Json(json!({
        "generating": true,
        "mode": mode,
    })))
}

#[derive(Debug, Deserialize)]
pub struct WatcherEnabledRequest {
    pub enabled: bool,
}

/// POST /api/watcher/enabled
pub async fn post_watcher_enabled(
    State(state): State<AppState>,
    Json(request): Json<WatcherEnabledRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(watcher) = &state.watcher else {
        return Err(OptimizerError::InvalidRequest("file watcher is not running".into()).into());
    };

    watcher.set_enabled(request.enabled);
    Ok(Json(json!({ "enabled": watcher.enabled() })))
}
