//! Partition a table's outcomes into buckets.
//!
//! Every winning outcome lands in exactly one bucket; losses are collected
//! separately. Outcomes that fit no bucket (only possible when validation was
//! skipped) are routed to the bucket with the closest endpoint.

use crate::optimizer::config::{BucketConfig, BucketConstraint};

/// A bucket plus the outcomes assigned to it, with solver state attached.
#[derive(Debug, Clone)]
pub struct BucketAssignment {
    pub config: BucketConfig,
    pub outcome_indices: Vec<usize>,
    pub payouts: Vec<f64>,
    pub avg_payout: f64,

    /// Total target probability for the bucket (filled by the solver).
    pub target_prob: f64,
    /// Per-outcome probabilities, parallel to `outcome_indices`; empty for
    /// evenly-distributed buckets.
    pub outcome_probs: Vec<f64>,
    pub rtp_contribution: f64,
    pub is_auto: bool,
    /// Legacy whole-bucket voiding flag.
    pub is_voided: bool,
}

impl BucketAssignment {
    fn new(config: BucketConfig) -> Self {
        let is_auto = matches!(config.constraint, BucketConstraint::Auto { .. });
        Self {
            config,
            outcome_indices: Vec::new(),
            payouts: Vec::new(),
            avg_payout: 0.0,
            target_prob: 0.0,
            outcome_probs: Vec::new(),
            rtp_contribution: 0.0,
            is_auto,
            is_voided: false,
        }
    }
}

/// Assign each outcome to its bucket. Returns the assignments (in bucket
/// order) and the indices of loss outcomes.
pub fn assign_outcomes(
    buckets: &[BucketConfig],
    payouts: &[f64],
) -> (Vec<BucketAssignment>, Vec<usize>) {
    let mut assignments: Vec<BucketAssignment> = buckets
        .iter()
        .cloned()
        .map(BucketAssignment::new)
        .collect();
    let mut loss_indices = Vec::new();

    // The terminal bucket (largest upper edge) is closed on the right.
    let last_idx = assignments
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.config.max_payout.total_cmp(&b.config.max_payout))
        .map(|(i, _)| i);

    for (i, &payout) in payouts.iter().enumerate() {
        if payout <= 0.0 {
            loss_indices.push(i);
            continue;
        }

        let mut assigned = false;
        for (j, bucket) in assignments.iter_mut().enumerate() {
            let in_range = payout >= bucket.config.min_payout
                && if Some(j) == last_idx {
                    payout <= bucket.config.max_payout
                } else {
                    payout < bucket.config.max_payout
                };

            if in_range {
                bucket.outcome_indices.push(i);
                bucket.payouts.push(payout);
                assigned = true;
                break;
            }
        }

        if !assigned {
            // Route to the bucket with the closest endpoint.
            let mut closest = 0usize;
            let mut closest_dist = f64::MAX;
            for (j, bucket) in assignments.iter().enumerate() {
                let dist = (payout - bucket.config.min_payout)
                    .abs()
                    .min((payout - bucket.config.max_payout).abs());
                if dist < closest_dist {
                    closest_dist = dist;
                    closest = j;
                }
            }
            assignments[closest].outcome_indices.push(i);
            assignments[closest].payouts.push(payout);
        }
    }

    for bucket in &mut assignments {
        if !bucket.payouts.is_empty() {
            bucket.avg_payout = bucket.payouts.iter().sum::<f64>() / bucket.payouts.len() as f64;
        }
    }

    (assignments, loss_indices)
}
