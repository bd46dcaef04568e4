//! Optimizer endpoints: analysis, bucket optimization, weight apply/restore,
//! presets, and config generation.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api::{ApiError, AppState};
use crate::error::OptimizerError;
use crate::model::LookupTable;
use crate::optimizer::{
    analyzer, bucket_presets, profiles::{ConfigGenerator, PlayerProfile},
    suggest_buckets, validate_buckets, BruteForceOptimizer, BruteForceResult, BucketConfig,
    BucketOptimizer, OptimizeResult, OptimizerConfig, BASE_WEIGHT,
};

/// Wire request for both the HTTP and the streaming optimize endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketOptimizeRequest {
    #[serde(default)]
    pub target_rtp: f64,
    #[serde(default)]
    pub rtp_tolerance: f64,
    #[serde(default)]
    pub buckets: Vec<BucketConfig>,
    #[serde(default)]
    pub save_to_file: bool,
    #[serde(default)]
    pub create_backup: bool,
    #[serde(default)]
    pub enable_brute_force: bool,
    #[serde(default)]
    pub max_iterations: usize,
    #[serde(default)]
    pub global_max_win_freq: Option<f64>,
    #[serde(default)]
    pub enable_voiding: bool,
    #[serde(default)]
    pub voided_bucket_indices: Vec<usize>,
    #[serde(default)]
    pub enable_auto_voiding: bool,
}

impl BucketOptimizeRequest {
    /// Fill defaults and resolve the final bucket set against a table.
    pub fn resolve(
        mut self,
        table: &LookupTable,
        default_tolerance: f64,
    ) -> Result<(Self, Vec<BucketConfig>), OptimizerError> {
        if self.target_rtp <= 0.0 {
            self.target_rtp = 0.97;
        }
        if self.rtp_tolerance <= 0.0 {
            self.rtp_tolerance = default_tolerance;
        }

        let buckets = if self.buckets.is_empty() {
            suggest_buckets(table, self.target_rtp)
        } else {
            validate_buckets(&self.buckets)?;
            self.buckets.clone()
        };

        Ok((self, buckets))
    }

    pub fn to_config(&self, buckets: Vec<BucketConfig>) -> OptimizerConfig {
        OptimizerConfig {
            target_rtp: self.target_rtp,
            rtp_tolerance: self.rtp_tolerance,
            buckets,
            min_weight: 1,
            max_iterations: if self.max_iterations == 0 {
                1000
            } else {
                self.max_iterations
            },
            global_max_win_freq: self.global_max_win_freq,
            enable_voiding: self.enable_voiding,
            voided_bucket_indices: self.voided_bucket_indices.clone(),
            enable_auto_voiding: self.enable_auto_voiding,
        }
    }
}

fn mode_note(cost: f64) -> String {
    if cost > 1.5 {
        format!(
            "Bonus mode (cost={cost:.0}x). Payouts are normalized: a {cost:.0}x absolute payout = 1.0x normalized."
        )
    } else {
        "Standard mode. Payouts are shown as bet multipliers.".to_string()
    }
}

pub(crate) fn mode_info(table: &LookupTable) -> Value {
    let max_payout = table
        .normalized_payouts()
        .into_iter()
        .fold(0.0f64, f64::max);
    json!({
        "cost": table.cost,
        "is_bonus_mode": table.cost > 1.5,
        "note": mode_note(table.cost),
        "max_payout": max_payout,
    })
}

/// Response body shared by the HTTP and WS optimize paths.
pub(crate) fn optimize_response(
    table: &LookupTable,
    request: &BucketOptimizeRequest,
    buckets: &[BucketConfig],
    result: &OptimizeResult,
    brute_force: Option<&BruteForceResult>,
    save_info: Option<Value>,
) -> Value {
    let mut response = json!({
        "original_rtp": result.original_rtp,
        "final_rtp": result.final_rtp,
        "target_rtp": result.target_rtp,
        "converged": result.converged,
        "total_weight": result.total_weight,
        "new_weights": result.new_weights,
        "bucket_results": result.bucket_results,
        "loss_result": result.loss_result,
        "warnings": result.warnings,
        "outcome_details": result.outcome_details,
        "mode_info": mode_info(table),
        "config": {
            "target_rtp": request.target_rtp,
            "rtp_tolerance": request.rtp_tolerance,
            "buckets": buckets,
            "base_weight": BASE_WEIGHT,
            "enable_brute_force": request.enable_brute_force,
            "enable_voiding": request.enable_voiding,
            "enable_auto_voiding": request.enable_auto_voiding,
        },
    });

    if !result.voided_buckets.is_empty() {
        response["voided_buckets"] = json!(result.voided_buckets);
    }
    if !result.voided_outcomes.is_empty() {
        response["voided_outcomes"] = json!(result.voided_outcomes);
        response["total_voided"] = json!(result.total_voided);
        response["voided_rtp"] = json!(result.voided_rtp);
    }
    if let Some(bf) = brute_force {
        response["brute_force_info"] = json!({
            "iterations": bf.iterations,
            "search_duration_ms": bf.search_duration_ms,
            "final_error": bf.final_error,
        });
    }
    if let Some(save_info) = save_info {
        response["save_result"] = save_info;
    }

    response
}

/// Persist weights (with optional backup) and invalidate the mode's cached
/// distribution.
pub(crate) fn save_and_invalidate(
    state: &AppState,
    mode: &str,
    weights: &[u64],
    create_backup: bool,
) -> Result<Value, OptimizerError> {
    let save_info = if create_backup {
        let backup_path = state.loader.save_weights_with_backup(mode, weights)?;
        json!({ "saved": true, "backup_path": backup_path })
    } else {
        state.loader.save_weights(mode, weights)?;
        json!({ "saved": true })
    };
    state.distributions.invalidate(mode);
    Ok(save_info)
}

// ===== Analysis =====

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub target_rtp: Option<f64>,
}

/// GET /api/optimizer/:mode/analyze?target_rtp=0.96
///
/// Values above 1.0 are legal for high-RTP and extreme modes; infeasibility
/// is reported inside the analysis, never as an error.
pub async fn get_analyze_mode(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<Value>, ApiError> {
    let target_rtp = query.target_rtp.filter(|&t| t > 0.0).unwrap_or(0.96);
    let table = state.loader.get_mode(&mode)?;
    let analysis = analyzer::analyze_table(&table, target_rtp)?;
    Ok(Json(json!(analysis)))
}

// ===== Bucket optimization =====

/// POST /api/optimizer/:mode/bucket-optimize
pub async fn post_bucket_optimize(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Json(request): Json<BucketOptimizeRequest>,
) -> Result<Json<Value>, ApiError> {
    let table = state.loader.get_mode(&mode)?;
    let (request, buckets) = request.resolve(&table, 0.001)?;

    let config = request.to_config(buckets.clone());
    config.validate()?;

    let worker_table = table.clone();
    let brute_force = request.enable_brute_force;
    let worker_config = config.clone();
    let (result, bf_result) = tokio::task::spawn_blocking(move || {
        if brute_force {
            let optimizer = BruteForceOptimizer::new(worker_config, None);
            optimizer
                .optimize_table(&worker_table)
                .map(|bf| (bf.result.clone(), Some(bf)))
        } else {
            BucketOptimizer::new(worker_config)
                .optimize_table(&worker_table)
                .map(|r| (r, None))
        }
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("optimizer task panicked: {e}")))??;

    let save_info = if request.save_to_file {
        Some(save_and_invalidate(
            &state,
            &mode,
            &result.new_weights,
            request.create_backup,
        )?)
    } else {
        None
    };

    info!(
        %mode,
        final_rtp = result.final_rtp,
        converged = result.converged,
        "bucket optimize complete"
    );

    Ok(Json(optimize_response(
        &table,
        &request,
        &buckets,
        &result,
        bf_result.as_ref(),
        save_info,
    )))
}

// ===== Suggest buckets =====

/// GET /api/optimizer/:mode/suggest-buckets?target_rtp=0.97
pub async fn get_suggest_buckets(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<Value>, ApiError> {
    let target_rtp = query
        .target_rtp
        .filter(|&t| t > 0.0 && t < 1.0)
        .unwrap_or(0.97);
    let table = state.loader.get_mode(&mode)?;
    let buckets = suggest_buckets(&table, target_rtp);

    let mut min_payout = f64::MAX;
    let mut max_payout = 0.0f64;
    let mut payout_counts: std::collections::BTreeMap<&'static str, usize> =
        Default::default();
    for outcome in &table.outcomes {
        let payout = table.normalized_payout(outcome);
        if payout > max_payout {
            max_payout = payout;
        }
        if payout > 0.0 && payout < min_payout {
            min_payout = payout;
        }
        let tier = match payout {
            p if p <= 0.0 => "loss",
            p if p < 1.0 => "sub_1x",
            p if p < 5.0 => "1x-5x",
            p if p < 20.0 => "5x-20x",
            p if p < 100.0 => "20x-100x",
            p if p < 1000.0 => "100x-1000x",
            _ => "1000x+",
        };
        *payout_counts.entry(tier).or_default() += 1;
    }
    if min_payout == f64::MAX {
        min_payout = 0.0;
    }

    Ok(Json(json!({
        "suggested_buckets": buckets,
        "table_stats": {
            "outcome_count": table.outcomes.len(),
            "max_payout": max_payout,
            "min_payout": min_payout,
            "payout_counts": payout_counts,
            "current_rtp": table.rtp(),
        },
        "mode_info": mode_info(&table),
    })))
}

// ===== Apply / backups / restore =====

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub weights: Vec<u64>,
    #[serde(default)]
    pub create_backup: bool,
}

/// POST /api/optimizer/:mode/apply
pub async fn post_apply(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.weights.is_empty() {
        return Err(OptimizerError::InvalidRequest("weights required".into()).into());
    }

    let save_info =
        save_and_invalidate(&state, &mode, &request.weights, request.create_backup)?;

    let mut response = json!({
        "saved": true,
        "message": "Weights applied successfully",
    });
    if let Some(backup_path) = save_info.get("backup_path") {
        response["backup_path"] = backup_path.clone();
    }
    Ok(Json(response))
}

/// GET /api/optimizer/:mode/backups
pub async fn get_backups(
    State(state): State<AppState>,
    Path(mode): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let backups = state.loader.list_backups(&mode)?;
    Ok(Json(json!(backups)))
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub backup_file: String,
    #[serde(default)]
    pub create_backup: bool,
}

/// POST /api/optimizer/:mode/restore
pub async fn post_restore(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Json(request): Json<RestoreRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.backup_file.is_empty() {
        return Err(OptimizerError::InvalidRequest("backup_file required".into()).into());
    }

    let weights = state.loader.read_backup_weights(&request.backup_file)?;
    let save_info = save_and_invalidate(&state, &mode, &weights, request.create_backup)?;

    let mut response = json!({
        "restored": true,
        "restored_from": request.backup_file,
        "message": "Weights restored successfully",
    });
    if let Some(backup_path) = save_info.get("backup_path") {
        response["pre_restore_backup"] = backup_path.clone();
    }
    Ok(Json(response))
}

// ===== Presets / profiles / config generation =====

/// GET /api/optimizer/bucket-presets
pub async fn get_bucket_presets() -> Json<Value> {
    let presets: serde_json::Map<String, Value> = bucket_presets()
        .into_iter()
        .map(|(name, buckets)| (name.to_string(), json!(buckets)))
        .collect();
    Json(Value::Object(presets))
}

/// GET /api/optimizer/profiles
pub async fn get_profiles() -> Json<Value> {
    let profiles: Vec<Value> = PlayerProfile::all()
        .into_iter()
        .map(|p| {
            json!({
                "id": p,
                "name": p.display_name(),
                "description": p.description(),
            })
        })
        .collect();
    Json(json!(profiles))
}

#[derive(Debug, Deserialize)]
pub struct GenerateConfigsQuery {
    pub target_rtp: Option<f64>,
    pub max_win: Option<f64>,
}

/// GET /api/optimizer/generate-configs?target_rtp=0.96&max_win=5000
pub async fn get_generate_configs(Query(query): Query<GenerateConfigsQuery>) -> Json<Value> {
    let target_rtp = query
        .target_rtp
        .filter(|&t| t > 0.0 && t <= 1.0)
        .unwrap_or(0.96);
    let max_win = query.max_win.filter(|&m| m > 0.0).unwrap_or(5000.0);

    let set = ConfigGenerator::new().generate_all_profiles(target_rtp, max_win);
    Json(json!(set))
}

#[derive(Debug, Deserialize)]
pub struct GenerateConfigRequest {
    #[serde(default)]
    pub target_rtp: f64,
    #[serde(default)]
    pub max_win: f64,
    pub profile: Option<PlayerProfile>,
}

/// POST /api/optimizer/generate-config
pub async fn post_generate_config(
    Json(request): Json<GenerateConfigRequest>,
) -> Result<Json<Value>, ApiError> {
    let target_rtp = if request.target_rtp > 0.0 && request.target_rtp <= 1.0 {
        request.target_rtp
    } else {
        0.96
    };
    let max_win = if request.max_win > 0.0 {
        request.max_win
    } else {
        5000.0
    };
    let profile = request.profile.unwrap_or_default();

    let config = ConfigGenerator::new().generate_config(target_rtp, max_win, profile);
    crate::optimizer::profiles::validate_generated_config(&config)?;
    Ok(Json(json!(config)))
}

/// GET /api/optimizer/:mode/generate-configs?target_rtp=0.96
///
/// Adaptive generation from the mode's analysis, one config per volatility
/// profile; falls back to the static ladder when the analysis yields nothing
/// usable.
pub async fn get_generate_configs_for_mode(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<Value>, ApiError> {
    let target_rtp = query.target_rtp.filter(|&t| t > 0.0).unwrap_or(0.96);
    let table = state.loader.get_mode(&mode)?;

    let max_payout = table
        .normalized_payouts()
        .into_iter()
        .fold(0.0f64, f64::max);

    let analysis = analyzer::analyze_table(&table, target_rtp)?;
    let generator = ConfigGenerator::new();

    let configs: Vec<Value> = PlayerProfile::all()
        .into_iter()
        .map(|profile| {
            let adaptive =
                analyzer::create_buckets_from_analysis(&analysis, target_rtp, profile);
            let buckets = if !adaptive.is_empty() && validate_buckets(&adaptive).is_ok() {
                adaptive
            } else {
                generator
                    .generate_config(target_rtp.min(1.0), max_payout, profile)
                    .buckets
            };
            json!({
                "profile": profile,
                "name": profile.display_name(),
                "description": profile.description(),
                "buckets": buckets,
            })
        })
        .collect();

    let mut analysis_data = json!({
        "mode_type": analysis.mode_type,
        "feasible": analysis.feasible,
        "feasibility_note": analysis.feasibility_note,
        "min_achievable_rtp": analysis.min_achievable_rtp,
        "max_achievable_rtp": analysis.max_achievable_rtp,
        "suggested_rtp": analysis.suggested_rtp,
        "is_bonus_mode": analysis.is_bonus_mode,
    });

    // When the target is unreachably low, say which buckets to void.
    if !analysis.feasible && analysis.min_achievable_rtp > target_rtp {
        let payouts = table.normalized_payouts();
        let buckets = suggest_buckets(&table, target_rtp.min(1.0));
        let suggestions = analyzer::void_suggestions(
            &buckets,
            &payouts,
            target_rtp,
            analysis.min_achievable_rtp,
        );
        if !suggestions.is_empty() {
            analysis_data["suggested_void_buckets"] = json!(suggestions);
        }
    }

    Ok(Json(json!({
        "mode": mode,
        "max_payout": max_payout,
        "target_rtp": target_rtp,
        "current_rtp": table.rtp(),
        "configs": configs,
        "analysis": analysis_data,
    })))
}
