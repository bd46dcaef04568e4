//! Bucket-constrained LUT weight optimization.
//!
//! The pipeline: assign outcomes to buckets, solve per-bucket target
//! probabilities, materialize integer weights with the loss closed form,
//! fine-tune, and report. `brute_force` wraps the pipeline in an iterative
//! search with streaming progress; `analyzer` classifies modes and
//! recommends bucket configurations; `profiles` generates volatility-tuned
//! config templates.

pub mod analyzer;
pub mod assignment;
pub mod brute_force;
pub mod config;
pub mod profiles;
pub mod result;
pub mod solver;
pub mod voiding;
pub mod weights;

use std::collections::HashSet;

use crate::error::OptimizerError;
use crate::model::{rtp_from_weights, LookupTable};

pub use brute_force::BruteForceOptimizer;
pub use config::{
    bucket_presets, default_buckets, suggest_buckets, validate_buckets, BucketConfig,
    BucketConstraint, OptimizerConfig, OutcomeFrequency,
};
pub use result::{
    BruteForceProgress, BruteForceResult, BucketResult, OptimizeResult, OutcomeDetail,
    SearchPhase, VoidReason, VoidedBucketInfo, VoidedOutcomeInfo,
};
pub use weights::BASE_WEIGHT;

/// One-shot bucket optimizer.
pub struct BucketOptimizer {
    config: OptimizerConfig,
}

impl BucketOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run the full pipeline once.
    pub fn optimize_table(&self, table: &LookupTable) -> Result<OptimizeResult, OptimizerError> {
        self.optimize_table_scaled(table, 1.0)
    }

    /// Run the pipeline with a multiplier on the RTP handed to auto buckets.
    /// The brute-force refiner walks this scale toward convergence.
    pub(crate) fn optimize_table_scaled(
        &self,
        table: &LookupTable,
        auto_scale: f64,
    ) -> Result<OptimizeResult, OptimizerError> {
        let cfg = &self.config;
        if table.outcomes.is_empty() {
            return Err(OptimizerError::EmptyTable);
        }

        let payouts = table.normalized_payouts();
        let original_weights: Vec<u64> = table.outcomes.iter().map(|o| o.weight).collect();
        let sim_ids: Vec<i64> = table.outcomes.iter().map(|o| o.sim_id).collect();
        let original_rtp = rtp_from_weights(&original_weights, &payouts);

        // Auto-voiding: drop outcomes when the uniform-weight floor exceeds
        // the target.
        let mut voided: HashSet<usize> = HashSet::new();
        let mut voided_outcomes = Vec::new();
        let mut voided_rtp = 0.0f64;
        if cfg.enable_auto_voiding {
            let floor = voiding::min_achievable_rtp(&payouts);
            let (indices, infos) =
                voiding::auto_select_voids(&payouts, &sim_ids, cfg.target_rtp, floor);
            voided_rtp = infos.iter().map(|v| v.rtp_loss).sum();
            voided.extend(indices);
            voided_outcomes = infos;
        }

        let (mut assignments, loss_indices) = assignment::assign_outcomes(&cfg.buckets, &payouts);

        // Legacy whole-bucket voiding, kept for protocol back-compat.
        let mut voided_buckets = Vec::new();
        if cfg.enable_voiding {
            for &idx in &cfg.voided_bucket_indices {
                let Some(bucket) = assignments.get_mut(idx) else {
                    continue;
                };
                bucket.is_voided = true;
                let contribution = bucket.avg_payout * bucket.outcome_indices.len() as f64
                    / payouts.len() as f64
                    * 100.0;
                voided_buckets.push(VoidedBucketInfo {
                    index: idx,
                    name: bucket.config.name.clone(),
                    outcome_count: bucket.outcome_indices.len(),
                    rtp_contribution: contribution,
                });
                voided.extend(bucket.outcome_indices.iter().copied());
            }
        }

        let mut warnings = solver::solve_target_probabilities(
            &mut assignments,
            &sim_ids,
            cfg.target_rtp,
            auto_scale,
            cfg.global_max_win_freq,
        );

        let mut out = weights::materialize_weights(
            &payouts,
            &assignments,
            &loss_indices,
            &voided,
            cfg.target_rtp,
            cfg.min_weight,
        );

        let mut final_rtp = rtp_from_weights(&out.weights, &payouts);
        let mut converged = (final_rtp - cfg.target_rtp).abs() <= cfg.rtp_tolerance;

        if !converged && !loss_indices.is_empty() {
            weights::fine_tune_loss_weight(
                &mut out.weights,
                &payouts,
                &loss_indices,
                &voided,
                cfg.target_rtp,
                cfg.min_weight,
            );
            final_rtp = rtp_from_weights(&out.weights, &payouts);
            converged = (final_rtp - cfg.target_rtp).abs() <= cfg.rtp_tolerance;
            out.loss_result = weights::loss_bucket_result(&out.weights, &loss_indices);
        }

        if !converged {
            if let Some(w) = weights::deviation_warning(final_rtp, cfg.target_rtp) {
                warnings.push(w);
            }
        }

        if !voided_buckets.is_empty() {
            let names: Vec<&str> = voided_buckets.iter().map(|v| v.name.as_str()).collect();
            warnings.push(format!(
                "Voided {} bucket(s) to reach target RTP: {:?}",
                voided_buckets.len(),
                names
            ));
        }
        if !voided_outcomes.is_empty() {
            warnings.push(format!(
                "Auto-voided {} outcome(s), removed {:.2}% RTP",
                voided_outcomes.len(),
                voided_rtp * 100.0
            ));
        }

        let outcome_details = build_outcome_details(
            table,
            &payouts,
            &original_weights,
            &out.weights,
            &assignments,
            &loss_indices,
            &voided,
        );

        let total_voided = voided_outcomes.len();
        Ok(OptimizeResult {
            original_rtp,
            final_rtp,
            target_rtp: cfg.target_rtp,
            converged,
            total_weight: out.weights.iter().sum(),
            new_weights: out.weights,
            bucket_results: out.bucket_results,
            loss_result: out.loss_result,
            warnings,
            outcome_details,
            voided_buckets,
            voided_outcomes,
            total_voided,
            voided_rtp,
        })
    }
}

fn build_outcome_details(
    table: &LookupTable,
    payouts: &[f64],
    old_weights: &[u64],
    new_weights: &[u64],
    assignments: &[assignment::BucketAssignment],
    loss_indices: &[usize],
    voided: &HashSet<usize>,
) -> Vec<OutcomeDetail> {
    let total_weight: u64 = new_weights.iter().sum();

    let mut bucket_names: Vec<String> = vec![String::new(); payouts.len()];
    for bucket in assignments {
        for &idx in &bucket.outcome_indices {
            bucket_names[idx] = if bucket.is_voided || voided.contains(&idx) {
                format!("{} (voided)", bucket.config.name)
            } else {
                bucket.config.name.clone()
            };
        }
    }
    for &idx in loss_indices {
        bucket_names[idx] = "loss".into();
    }

    payouts
        .iter()
        .enumerate()
        .map(|(i, &p)| OutcomeDetail {
            sim_id: table.outcomes[i].sim_id,
            payout: p * table.cost,
            old_weight: old_weights[i],
            new_weight: new_weights[i],
            bucket_name: std::mem::take(&mut bucket_names[i]),
            probability: if total_weight > 0 {
                new_weights[i] as f64 / total_weight as f64
            } else {
                0.0
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;

    fn table(cost: f64, rows: &[(u64, u64)]) -> LookupTable {
        let outcomes = rows
            .iter()
            .enumerate()
            .map(|(i, &(payout_cents, weight))| Outcome::new(i as i64, payout_cents, weight))
            .collect();
        LookupTable::new("base", cost, outcomes)
    }

    fn config(target: f64, buckets: Vec<BucketConfig>) -> OptimizerConfig {
        OptimizerConfig {
            target_rtp: target,
            rtp_tolerance: 0.01,
            buckets,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn empty_table_is_rejected() {
        let optimizer = BucketOptimizer::new(config(0.5, default_buckets()));
        let empty = LookupTable::new("base", 1.0, Vec::new());
        assert!(matches!(
            optimizer.optimize_table(&empty),
            Err(OptimizerError::EmptyTable)
        ));
    }

    #[test]
    fn trivial_standard_mode() {
        // Scenario: (0, 2x, 5x), one frequency bucket over all wins,
        // target 0.5 +/- 0.01.
        let t = table(1.0, &[(0, 1), (200, 1), (500, 1)]);
        let cfg = config(
            0.5,
            vec![BucketConfig::frequency("wins", 0.01, 10.0, 2.0)],
        );
        let result = BucketOptimizer::new(cfg).optimize_table(&t).unwrap();

        assert!(result.converged);
        assert!((0.49..=0.51).contains(&result.final_rtp));
        assert_eq!(result.new_weights.len(), 3);
        assert!(result.new_weights.iter().all(|&w| w >= 1));
    }

    #[test]
    fn reported_final_rtp_matches_returned_weights() {
        let t = table(1.0, &[(0, 10), (100, 5), (250, 3), (1200, 1)]);
        let cfg = config(
            0.8,
            vec![
                BucketConfig::frequency("low", 0.01, 5.0, 4.0),
                BucketConfig::auto("high", 5.0, 100.0, 1.0),
            ],
        );
        let result = BucketOptimizer::new(cfg).optimize_table(&t).unwrap();

        let payouts = t.normalized_payouts();
        let direct = rtp_from_weights(&result.new_weights, &payouts);
        assert!((direct - result.final_rtp).abs() < 1e-9);
    }

    #[test]
    fn auto_voiding_duplicates_scenario() {
        // Eight 5x outcomes plus one loss; target 0.1 forces voiding.
        let rows: Vec<(u64, u64)> = (0..8).map(|_| (500u64, 1u64)).chain([(0, 1)]).collect();
        let t = table(1.0, &rows);
        let mut cfg = config(0.1, vec![BucketConfig::auto("wins", 0.01, 10.0, 1.0)]);
        cfg.enable_auto_voiding = true;

        let result = BucketOptimizer::new(cfg).optimize_table(&t).unwrap();

        assert_eq!(result.total_voided, 7);
        assert!(result
            .voided_outcomes
            .iter()
            .all(|v| v.reason == VoidReason::Duplicate));
        assert!((result.voided_rtp - 7.0 * 5.0 / 9.0).abs() < 1e-9);

        // Voided outcomes carry zero weight; survivors keep the floor.
        let zero_count = result.new_weights.iter().filter(|&&w| w == 0).count();
        assert_eq!(zero_count, 7);
        assert_eq!(result.new_weights.len(), 9);
    }

    #[test]
    fn legacy_bucket_voiding_reports_and_warns() {
        let t = table(1.0, &[(0, 1), (100, 1), (5_000, 1)]);
        let mut cfg = config(
            0.5,
            vec![
                BucketConfig::frequency("low", 0.01, 10.0, 3.0),
                BucketConfig::rtp_percent("high", 10.0, 100.0, 10.0),
            ],
        );
        cfg.enable_voiding = true;
        cfg.voided_bucket_indices = vec![1];

        let result = BucketOptimizer::new(cfg).optimize_table(&t).unwrap();
        assert_eq!(result.voided_buckets.len(), 1);
        assert_eq!(result.voided_buckets[0].name, "high");
        assert!(result.warnings.iter().any(|w| w.contains("Voided 1 bucket")));
        // The 50x outcome is in the voided bucket and gets weight 0.
        assert_eq!(result.new_weights[2], 0);
    }

    #[test]
    fn infeasible_high_target_warns_over_ten_points() {
        // Winning payouts {0.2, 0.4, 0.6}: max achievable 0.6 < target 1.0.
        let t = table(1.0, &[(0, 1), (20, 1), (40, 1), (60, 1)]);
        let cfg = config(1.0, vec![BucketConfig::frequency("wins", 0.01, 1.0, 2.0)]);
        let result = BucketOptimizer::new(cfg).optimize_table(&t).unwrap();

        assert!(!result.converged);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("below target")));
    }

    #[test]
    fn outcome_details_cover_every_row() {
        let t = table(1.0, &[(0, 1), (150, 2), (900, 1)]);
        let cfg = config(
            0.9,
            vec![BucketConfig::frequency("wins", 0.01, 10.0, 3.0)],
        );
        let result = BucketOptimizer::new(cfg).optimize_table(&t).unwrap();

        assert_eq!(result.outcome_details.len(), 3);
        assert_eq!(result.outcome_details[0].bucket_name, "loss");
        let prob_sum: f64 = result.outcome_details.iter().map(|d| d.probability).sum();
        assert!((prob_sum - 1.0).abs() < 1e-9);
    }
}
