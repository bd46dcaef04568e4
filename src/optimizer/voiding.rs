//! Automatic outcome voiding.
//!
//! When the target RTP sits below the table's uniform-weight floor
//! (`mean(normalized payouts)`), no weight vector can reach it while every
//! outcome keeps a positive weight. Voiding drops outcomes to weight 0:
//! duplicates of the same payout first, then unique payouts highest-first.

use std::collections::HashMap;

use crate::optimizer::result::{VoidReason, VoidedOutcomeInfo};

/// The lowest RTP reachable with every outcome at the minimum weight, i.e.
/// the uniform-weight mean payout.
pub fn min_achievable_rtp(payouts: &[f64]) -> f64 {
    if payouts.is_empty() {
        return 0.0;
    }
    payouts.iter().sum::<f64>() / payouts.len() as f64
}

struct PayoutGroup {
    payout: f64,
    indices: Vec<usize>,
    sim_ids: Vec<i64>,
    rtp_per_outcome: f64,
}

/// Select outcomes to void until the uniform-weight RTP drops to the target.
///
/// Phase 1 voids all-but-one of every duplicated payout (highest payouts
/// first); phase 2 voids one remaining outcome per payout, highest first,
/// until the deficit is covered or candidates run out. Each removal
/// contributes `payout / n` where n is the total outcome count.
pub fn auto_select_voids(
    payouts: &[f64],
    sim_ids: &[i64],
    target_rtp: f64,
    current_min_rtp: f64,
) -> (Vec<usize>, Vec<VoidedOutcomeInfo>) {
    if current_min_rtp <= target_rtp || payouts.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let rtp_to_remove = current_min_rtp - target_rtp;
    let n = payouts.len();

    // Group winning outcomes by exact payout (bit pattern).
    let mut groups: HashMap<u64, PayoutGroup> = HashMap::new();
    for (i, &p) in payouts.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        let group = groups.entry(p.to_bits()).or_insert_with(|| PayoutGroup {
            payout: p,
            indices: Vec::new(),
            sim_ids: Vec::new(),
            rtp_per_outcome: p / n as f64,
        });
        group.indices.push(i);
        group.sim_ids.push(sim_ids[i]);
    }

    let mut sorted_groups: Vec<&PayoutGroup> = groups.values().collect();
    sorted_groups.sort_by(|a, b| b.payout.total_cmp(&a.payout));

    let mut voided_indices = Vec::new();
    let mut voided_outcomes = Vec::new();
    let mut removed_rtp = 0.0f64;

    // Phase 1: duplicates (keep the first of each group).
    for group in &sorted_groups {
        if removed_rtp >= rtp_to_remove {
            break;
        }
        if group.indices.len() > 1 {
            for k in 1..group.indices.len() {
                if removed_rtp >= rtp_to_remove {
                    break;
                }
                voided_indices.push(group.indices[k]);
                voided_outcomes.push(VoidedOutcomeInfo {
                    sim_id: group.sim_ids[k],
                    payout: group.payout,
                    reason: VoidReason::Duplicate,
                    rtp_loss: group.rtp_per_outcome,
                });
                removed_rtp += group.rtp_per_outcome;
            }
        }
    }

    // Phase 2: one remaining outcome per group, highest payout first. Never
    // void the last surviving winner; a table with no wins is degenerate.
    let total_winners: usize = sorted_groups.iter().map(|g| g.indices.len()).sum();
    let mut remaining_winners = total_winners - voided_indices.len();

    for group in &sorted_groups {
        if removed_rtp >= rtp_to_remove || remaining_winners <= 1 {
            break;
        }
        if let Some((k, &idx)) = group
            .indices
            .iter()
            .enumerate()
            .find(|&(_, idx)| !voided_indices.contains(idx))
        {
            voided_indices.push(idx);
            voided_outcomes.push(VoidedOutcomeInfo {
                sim_id: group.sim_ids[k],
                payout: group.payout,
                reason: VoidReason::HighPayout,
                rtp_loss: group.rtp_per_outcome,
            });
            removed_rtp += group.rtp_per_outcome;
            remaining_winners -= 1;
        }
    }

    (voided_indices, voided_outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_voiding_when_target_is_reachable() {
        let payouts = [0.0, 1.0, 2.0];
        let sim_ids = [0i64, 1, 2];
        let floor = min_achievable_rtp(&payouts);
        let (indices, infos) = auto_select_voids(&payouts, &sim_ids, floor + 0.1, floor);
        assert!(indices.is_empty());
        assert!(infos.is_empty());
    }

    #[test]
    fn duplicates_are_voided_first() {
        // Eight outcomes at 5.0x plus one loss; target 0.1.
        // Floor = 40/9 ≈ 4.44; phase 1 alone covers the deficit by voiding
        // seven of the eight duplicates (7 * 5/9 ≈ 3.89).
        let payouts = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 0.0];
        let sim_ids: Vec<i64> = (0..9).collect();
        let floor = min_achievable_rtp(&payouts);

        let (indices, infos) = auto_select_voids(&payouts, &sim_ids, 0.1, floor);
        assert_eq!(indices.len(), 7);
        assert!(infos.iter().all(|v| v.reason == VoidReason::Duplicate));

        let removed: f64 = infos.iter().map(|v| v.rtp_loss).sum();
        assert!((removed - 7.0 * 5.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn phase_two_takes_unique_high_payouts() {
        // Unique payouts only; floor = 60/4 = 15. Target 1.0 needs 14 points
        // removed: phase 2 voids 50 then 9, leaving 1.
        let payouts = [50.0, 9.0, 1.0, 0.0];
        let sim_ids = [0i64, 1, 2, 3];
        let floor = min_achievable_rtp(&payouts);

        let (indices, infos) = auto_select_voids(&payouts, &sim_ids, 1.0, floor);
        assert_eq!(indices, vec![0, 1]);
        assert!(infos.iter().all(|v| v.reason == VoidReason::HighPayout));
        assert!((infos[0].rtp_loss - 50.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn removed_rtp_is_strictly_monotone() {
        let payouts = [10.0, 10.0, 4.0, 2.0, 0.0];
        let sim_ids: Vec<i64> = (0..5).collect();
        let floor = min_achievable_rtp(&payouts);

        let (_, infos) = auto_select_voids(&payouts, &sim_ids, 0.5, floor);
        let mut running = 0.0;
        for info in &infos {
            assert!(info.rtp_loss > 0.0);
            running += info.rtp_loss;
        }
        assert!(running > 0.0);
    }
}
