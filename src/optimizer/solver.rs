//! Target-probability solver.
//!
//! Two passes over the bucket assignments: explicit constraints first
//! (frequency, rtp_percent, max_win_freq, outcome_freq), then auto buckets
//! share whatever RTP is left via the inverse-payout-power rule:
//!
//! ```text
//! prob_j = remaining_rtp * payout_j^(-e) / sum_k payout_k^(1-e)
//! ```
//!
//! which makes each contribution `prob_j * payout_j` equal at e = 1 while the
//! contributions sum to `remaining_rtp`.

use crate::optimizer::assignment::BucketAssignment;
use crate::optimizer::config::BucketConstraint;

/// Fill `target_prob` / `outcome_probs` / `rtp_contribution` on every
/// non-voided assignment. `auto_scale` multiplies the RTP handed to auto
/// buckets; the brute-force refiner walks it toward convergence.
///
/// Returns human-readable warnings for constraint combinations that cannot
/// hit the target; the solve always proceeds.
pub fn solve_target_probabilities(
    assignments: &mut [BucketAssignment],
    sim_ids: &[i64],
    target_rtp: f64,
    auto_scale: f64,
    global_max_win_freq: Option<f64>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut used_rtp = 0.0f64;

    // Pass 1: explicit constraints.
    for bucket in assignments.iter_mut() {
        if bucket.outcome_indices.is_empty() || bucket.is_voided {
            continue;
        }

        match &bucket.config.constraint {
            BucketConstraint::Frequency { frequency } => {
                bucket.target_prob = 1.0 / frequency;
                bucket.rtp_contribution = bucket.target_prob * bucket.avg_payout;
                used_rtp += bucket.rtp_contribution;
            }
            BucketConstraint::MaxWinFreq { max_win_frequency } => {
                // The bucket is a narrow band around the max win, so the
                // outcome frequency and the bucket frequency coincide.
                bucket.target_prob = 1.0 / max_win_frequency;
                bucket.rtp_contribution = bucket.target_prob * bucket.avg_payout;
                used_rtp += bucket.rtp_contribution;
            }
            BucketConstraint::RtpPercent { rtp_percent } => {
                if bucket.avg_payout > 0.0 {
                    bucket.rtp_contribution = (rtp_percent / 100.0) * target_rtp;
                    bucket.target_prob = bucket.rtp_contribution / bucket.avg_payout;
                    used_rtp += bucket.rtp_contribution;
                }
            }
            BucketConstraint::OutcomeFreq {
                outcome_frequencies,
            } => {
                bucket.outcome_probs = vec![0.0; bucket.outcome_indices.len()];
                let mut total_prob = 0.0;
                let mut contribution = 0.0;
                for (j, &idx) in bucket.outcome_indices.iter().enumerate() {
                    let freq = outcome_frequencies
                        .iter()
                        .find(|f| f.sim_id == sim_ids[idx])
                        .map(|f| f.frequency);
                    if let Some(freq) = freq {
                        let prob = 1.0 / freq;
                        bucket.outcome_probs[j] = prob;
                        total_prob += prob;
                        contribution += prob * bucket.payouts[j];
                    }
                }
                if bucket
                    .outcome_probs
                    .iter()
                    .any(|&p| p == 0.0)
                {
                    warnings.push(format!(
                        "bucket {}: outcome_freq list does not cover every outcome; uncovered outcomes fall to the minimum weight",
                        bucket.config.name
                    ));
                }
                bucket.target_prob = total_prob;
                bucket.rtp_contribution = contribution;
                used_rtp += contribution;
            }
            BucketConstraint::Auto { .. } => {
                // Second pass.
            }
        }
    }

    if used_rtp > target_rtp {
        warnings.push(format!(
            "frequency/rtp_percent constraints already use {:.1}% RTP (target: {:.1}%); cannot reach target. Reduce frequencies or use auto buckets.",
            used_rtp * 100.0,
            target_rtp * 100.0
        ));
    }

    // Pass 2: auto buckets share the remaining RTP.
    let remaining_rtp = (target_rtp - used_rtp).max(0.0) * auto_scale;

    let mut sum_payout_pow = 0.0f64;
    for bucket in assignments.iter() {
        if !bucket.is_auto || bucket.is_voided {
            continue;
        }
        let exponent = auto_exponent(bucket);
        for &p in &bucket.payouts {
            if p > 0.0 {
                sum_payout_pow += p.powf(1.0 - exponent);
            }
        }
    }

    if sum_payout_pow > 0.0 && remaining_rtp > 0.0 {
        for bucket in assignments.iter_mut() {
            if !bucket.is_auto || bucket.is_voided || bucket.outcome_indices.is_empty() {
                continue;
            }
            let exponent = auto_exponent(bucket);

            bucket.outcome_probs = vec![0.0; bucket.payouts.len()];
            let mut total_prob = 0.0;
            let mut bucket_rtp = 0.0;
            for (j, &p) in bucket.payouts.iter().enumerate() {
                if p > 0.0 {
                    let prob = remaining_rtp * p.powf(-exponent) / sum_payout_pow;
                    bucket.outcome_probs[j] = prob;
                    total_prob += prob;
                    bucket_rtp += prob * p;
                }
            }
            bucket.target_prob = total_prob;
            bucket.rtp_contribution = bucket_rtp;
        }
    }

    // Global cap on the max-win outcome's frequency.
    if let Some(freq) = global_max_win_freq {
        warnings.extend(apply_global_max_win_cap(assignments, freq));
    }

    warnings
}

fn auto_exponent(bucket: &BucketAssignment) -> f64 {
    match bucket.config.constraint {
        BucketConstraint::Auto { auto_exponent } if auto_exponent > 0.0 => auto_exponent,
        _ => 1.0,
    }
}

/// Cap the probability of the single highest payout at `1 / freq`.
fn apply_global_max_win_cap(assignments: &mut [BucketAssignment], freq: f64) -> Vec<String> {
    let cap = 1.0 / freq;
    let mut warnings = Vec::new();

    // Locate the global max payout.
    let mut max_payout = 0.0f64;
    let mut location: Option<(usize, usize)> = None;
    for (b, bucket) in assignments.iter().enumerate() {
        if bucket.is_voided {
            continue;
        }
        for (j, &p) in bucket.payouts.iter().enumerate() {
            if p > max_payout {
                max_payout = p;
                location = Some((b, j));
            }
        }
    }

    let Some((b, j)) = location else {
        return warnings;
    };
    let bucket = &mut assignments[b];

    if !bucket.outcome_probs.is_empty() {
        let prob = bucket.outcome_probs[j];
        if prob > cap {
            bucket.outcome_probs[j] = cap;
            bucket.target_prob -= prob - cap;
            bucket.rtp_contribution -= (prob - cap) * max_payout;
            warnings.push(format!(
                "max win ({:.2}x) capped to 1 in {:.0} by global_max_win_freq",
                max_payout, freq
            ));
        }
    } else {
        let count = bucket.outcome_indices.len();
        if count > 0 {
            let share = bucket.target_prob / count as f64;
            if share > cap {
                let old = bucket.target_prob;
                bucket.target_prob = cap * count as f64;
                if old > 0.0 {
                    bucket.rtp_contribution *= bucket.target_prob / old;
                }
                warnings.push(format!(
                    "bucket {} capped to 1 in {:.0} per outcome by global_max_win_freq",
                    bucket.config.name, freq
                ));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::assignment::assign_outcomes;
    use crate::optimizer::config::BucketConfig;

    #[test]
    fn frequency_and_rtp_percent_passes() {
        let buckets = vec![
            BucketConfig::frequency("low", 0.0, 5.0, 4.0),
            BucketConfig::rtp_percent("high", 5.0, 100.0, 10.0),
        ];
        let payouts = [2.0, 2.0, 10.0];
        let sim_ids = [0i64, 1, 2];
        let (mut assignments, _) = assign_outcomes(&buckets, &payouts);

        let warnings =
            solve_target_probabilities(&mut assignments, &sim_ids, 0.96, 1.0, None);
        assert!(warnings.is_empty());

        // frequency 4 -> prob 0.25, avg payout 2.0 -> contribution 0.5.
        assert!((assignments[0].target_prob - 0.25).abs() < 1e-12);
        assert!((assignments[0].rtp_contribution - 0.5).abs() < 1e-12);

        // 10% of target RTP = 0.096, avg payout 10 -> prob 0.0096.
        assert!((assignments[1].rtp_contribution - 0.096).abs() < 1e-12);
        assert!((assignments[1].target_prob - 0.0096).abs() < 1e-12);
    }

    #[test]
    fn auto_bucket_contributions_are_equal_at_unit_exponent() {
        // Normalized payouts {2, 5, 10}: with e=1 each contribution
        // prob_j * p_j must be remaining/3 and the total must hit the target.
        let buckets = vec![BucketConfig::auto("all", 1.0, 20.0, 1.0)];
        let payouts = [2.0, 5.0, 10.0];
        let sim_ids = [0i64, 1, 2];
        let (mut assignments, _) = assign_outcomes(&buckets, &payouts);

        solve_target_probabilities(&mut assignments, &sim_ids, 0.6, 1.0, None);

        let bucket = &assignments[0];
        let contributions: Vec<f64> = bucket
            .outcome_probs
            .iter()
            .zip(&bucket.payouts)
            .map(|(prob, p)| prob * p)
            .collect();
        let total: f64 = contributions.iter().sum();

        assert!((total - 0.6).abs() < 0.6 * 0.01);
        for c in &contributions {
            assert!((c - 0.2).abs() < 1e-9);
        }
    }

    #[test]
    fn overcommitted_constraints_warn_but_proceed() {
        // frequency 1 in 1 on a 2x bucket -> 200% RTP used.
        let buckets = vec![BucketConfig::frequency("low", 0.0, 5.0, 1.0)];
        let payouts = [2.0];
        let sim_ids = [0i64];
        let (mut assignments, _) = assign_outcomes(&buckets, &payouts);

        let warnings =
            solve_target_probabilities(&mut assignments, &sim_ids, 0.96, 1.0, None);
        assert!(warnings.iter().any(|w| w.contains("cannot reach target")));
        assert!(assignments[0].target_prob > 0.0);
    }

    #[test]
    fn auto_scale_multiplies_remaining_rtp() {
        let buckets = vec![BucketConfig::auto("all", 1.0, 20.0, 1.0)];
        let payouts = [2.0, 5.0];
        let sim_ids = [0i64, 1];

        let (mut base, _) = assign_outcomes(&buckets, &payouts);
        solve_target_probabilities(&mut base, &sim_ids, 0.5, 1.0, None);

        let (mut scaled, _) = assign_outcomes(&buckets, &payouts);
        solve_target_probabilities(&mut scaled, &sim_ids, 0.5, 2.0, None);

        assert!((scaled[0].rtp_contribution - 2.0 * base[0].rtp_contribution).abs() < 1e-12);
    }

    #[test]
    fn global_max_win_freq_caps_the_top_outcome() {
        let buckets = vec![BucketConfig::auto("all", 0.0, 20.0, 1.0)];
        let payouts = [2.0, 10.0];
        let sim_ids = [0i64, 1];
        let (mut assignments, _) = assign_outcomes(&buckets, &payouts);

        let warnings = solve_target_probabilities(
            &mut assignments,
            &sim_ids,
            0.9,
            1.0,
            Some(1_000_000.0),
        );
        assert!(!warnings.is_empty());
        assert!(assignments[0].outcome_probs[1] <= 1.0 / 1_000_000.0 + 1e-15);
    }
}
