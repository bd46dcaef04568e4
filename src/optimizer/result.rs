//! Result types shared by the one-shot optimizer and the brute-force refiner.

use serde::{Deserialize, Serialize};

/// Per-bucket outcome of an optimization run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketResult {
    pub name: String,
    pub min_payout: f64,
    pub max_payout: f64,
    pub outcome_count: usize,
    pub target_probability: f64,
    pub actual_probability: f64,
    /// 1 in N, derived from the target probability.
    pub target_frequency: f64,
    pub actual_frequency: f64,
    /// Absolute % of RTP this bucket contributes.
    pub rtp_contribution: f64,
    pub total_weight: u64,
    pub avg_payout: f64,
}

/// Legacy whole-bucket voiding report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidedBucketInfo {
    pub index: usize,
    pub name: String,
    pub outcome_count: usize,
    pub rtp_contribution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoidReason {
    Duplicate,
    HighPayout,
}

/// A single outcome forced to weight 0 by auto-voiding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidedOutcomeInfo {
    pub sim_id: i64,
    pub payout: f64,
    pub reason: VoidReason,
    pub rtp_loss: f64,
}

/// Per-outcome weight assignment detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeDetail {
    pub sim_id: i64,
    pub payout: f64,
    pub old_weight: u64,
    pub new_weight: u64,
    pub bucket_name: String,
    pub probability: f64,
}

/// Full result of one optimization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResult {
    pub original_rtp: f64,
    pub final_rtp: f64,
    pub target_rtp: f64,
    pub converged: bool,
    pub new_weights: Vec<u64>,
    pub bucket_results: Vec<BucketResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loss_result: Option<BucketResult>,
    pub total_weight: u64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outcome_details: Vec<OutcomeDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub voided_buckets: Vec<VoidedBucketInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub voided_outcomes: Vec<VoidedOutcomeInfo>,
    #[serde(skip_serializing_if = "is_zero", default)]
    pub total_voided: usize,
    #[serde(skip_serializing_if = "is_zero_f64", default)]
    pub voided_rtp: f64,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

fn is_zero_f64(n: &f64) -> bool {
    *n == 0.0
}

/// Search phase reported on the progress stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Init,
    Search,
    Refine,
    Complete,
}

/// One progress event from the brute-force refiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForceProgress {
    pub phase: SearchPhase,
    pub iteration: usize,
    pub max_iter: usize,
    pub current_rtp: f64,
    pub target_rtp: f64,
    pub error: f64,
    pub converged: bool,
    pub elapsed_ms: u64,
}

/// Optimize result plus search statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForceResult {
    #[serde(flatten)]
    pub result: OptimizeResult,
    pub iterations: usize,
    pub search_duration_ms: u64,
    pub final_error: f64,
}
