//! Core table model: outcomes, lookup tables, and RTP arithmetic.
//!
//! Payouts are stored in hundredths of the bet ("cents"). All probability
//! math runs on *normalized* payouts: `cents / 100 / cost`, so a bonus mode
//! bought at 100x shows a 100x absolute payout as 1.0x normalized.

use serde::{Deserialize, Serialize};

/// One row of a lookup table: a payout with an integer probability weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub sim_id: i64,
    pub payout_cents: u64,
    pub weight: u64,
}

impl Outcome {
    pub fn new(sim_id: i64, payout_cents: u64, weight: u64) -> Self {
        Self {
            sim_id,
            payout_cents,
            weight,
        }
    }

    /// An outcome is a loss iff it pays nothing.
    pub fn is_loss(&self) -> bool {
        self.payout_cents == 0
    }
}

/// A mode's full outcome table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupTable {
    pub mode: String,
    /// Spin cost as a bet multiplier. Normalized to 1.0 when non-positive.
    pub cost: f64,
    pub outcomes: Vec<Outcome>,
}

impl LookupTable {
    pub fn new(mode: impl Into<String>, cost: f64, outcomes: Vec<Outcome>) -> Self {
        Self {
            mode: mode.into(),
            cost: if cost <= 0.0 { 1.0 } else { cost },
            outcomes,
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.outcomes.iter().map(|o| o.weight).sum()
    }

    pub fn max_payout_cents(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| o.payout_cents)
            .max()
            .unwrap_or(0)
    }

    /// Normalized payout of a single outcome.
    pub fn normalized_payout(&self, outcome: &Outcome) -> f64 {
        outcome.payout_cents as f64 / 100.0 / self.cost
    }

    /// Normalized payouts for every outcome, in table order.
    pub fn normalized_payouts(&self) -> Vec<f64> {
        self.outcomes
            .iter()
            .map(|o| self.normalized_payout(o))
            .collect()
    }

    /// Weight-weighted mean normalized payout.
    pub fn rtp(&self) -> f64 {
        let payouts = self.normalized_payouts();
        let weights: Vec<u64> = self.outcomes.iter().map(|o| o.weight).collect();
        rtp_from_weights(&weights, &payouts)
    }
}

/// RTP for an arbitrary weight vector over normalized payouts.
///
/// Returns 0.0 for an empty or zero-weight table rather than NaN.
pub fn rtp_from_weights(weights: &[u64], payouts: &[f64]) -> f64 {
    debug_assert_eq!(weights.len(), payouts.len());

    let mut weighted_payout = 0.0f64;
    let mut total_weight = 0u64;
    for (w, p) in weights.iter().zip(payouts) {
        weighted_payout += *w as f64 * p;
        total_weight += w;
    }

    if total_weight == 0 {
        return 0.0;
    }
    weighted_payout / total_weight as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(cost: f64, rows: &[(u64, u64)]) -> LookupTable {
        let outcomes = rows
            .iter()
            .enumerate()
            .map(|(i, &(payout_cents, weight))| Outcome::new(i as i64, payout_cents, weight))
            .collect();
        LookupTable::new("base", cost, outcomes)
    }

    #[test]
    fn rtp_is_weighted_mean_of_normalized_payouts() {
        // 0x @ w=1, 2x @ w=1, 5x @ w=2 -> (0 + 2 + 10) / 4 = 3.0
        let t = table(1.0, &[(0, 1), (200, 1), (500, 2)]);
        assert!((t.rtp() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn cost_normalizes_payouts() {
        // Bonus mode bought at 2x: a 400-cent payout is 2.0x normalized.
        let t = table(2.0, &[(400, 1)]);
        assert!((t.rtp() - 2.0).abs() < 1e-12);
        assert!((t.normalized_payouts()[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_positive_cost_defaults_to_one() {
        let t = table(0.0, &[(100, 1)]);
        assert_eq!(t.cost, 1.0);
    }

    #[test]
    fn zero_weight_table_has_zero_rtp() {
        let t = table(1.0, &[(100, 0), (200, 0)]);
        assert_eq!(t.rtp(), 0.0);
    }

    #[test]
    fn loss_detection() {
        assert!(Outcome::new(0, 0, 1).is_loss());
        assert!(!Outcome::new(0, 1, 1).is_loss());
    }
}
