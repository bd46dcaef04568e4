//! Mode analysis: payout statistics, classification, achievable RTP bounds,
//! adaptive bucket recommendations, and void suggestions.

use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::model::LookupTable;
use crate::optimizer::config::{BucketConfig, BucketConstraint};
use crate::optimizer::profiles::{volatility_modifiers, PlayerProfile};

/// Mode classification by target RTP, payout-range ratio, and cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeType {
    /// Standard slots, ~96% RTP.
    Standard,
    /// Bonus mode with a narrow payout range.
    BonusNarrow,
    /// Bonus mode with a wide payout range.
    BonusWide,
    /// Target RTP above 200%.
    HighRtp,
    /// Target RTP above 1000%.
    Extreme,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// A recommended bucket derived from the payout distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketRecommendation {
    pub min_payout: f64,
    pub max_payout: f64,
    pub outcome_count: usize,
    /// Max RTP contribution if this bucket got all the probability mass.
    pub rtp_capacity: f64,
    pub avg_payout: f64,
    /// Recommended share of the target RTP, as a percentage.
    pub suggested_rtp: f64,
    pub description: String,
}

/// Full analysis of a mode's lookup table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeAnalysis {
    pub mode: String,
    pub mode_type: ModeType,

    pub total_outcomes: usize,
    pub min_payout: f64,
    pub max_payout: f64,
    pub avg_payout: f64,
    pub payout_variance: f64,
    pub payout_std_dev: f64,
    pub percentiles: Percentiles,

    pub min_achievable_rtp: f64,
    pub max_achievable_rtp: f64,

    pub cost: f64,
    pub is_bonus_mode: bool,

    pub recommended_buckets: Vec<BucketRecommendation>,
    pub feasible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feasibility_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_rtp: Option<f64>,
}

/// Analyze a table against a target RTP.
///
/// Rejects empty tables and tables with no winning outcomes; everything else
/// (including an infeasible target) comes back as data, never as an error.
pub fn analyze_table(table: &LookupTable, target_rtp: f64) -> Result<ModeAnalysis, OptimizerError> {
    let n = table.outcomes.len();
    if n == 0 {
        return Err(OptimizerError::EmptyTable);
    }

    let mut win_payouts: Vec<f64> = Vec::with_capacity(n);
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for outcome in &table.outcomes {
        let payout = table.normalized_payout(outcome);
        if payout > 0.0 {
            win_payouts.push(payout);
            sum += payout;
            sum_sq += payout * payout;
        }
    }

    if win_payouts.is_empty() {
        return Err(OptimizerError::NoWinners);
    }

    win_payouts.sort_by(f64::total_cmp);
    let min_payout = win_payouts[0];
    let max_payout = *win_payouts.last().unwrap();

    let avg_payout = sum / win_payouts.len() as f64;
    let payout_variance = (sum_sq / win_payouts.len() as f64 - avg_payout * avg_payout).max(0.0);
    let payout_std_dev = payout_variance.sqrt();

    let percentiles = Percentiles {
        p10: percentile(&win_payouts, 0.10),
        p25: percentile(&win_payouts, 0.25),
        p50: percentile(&win_payouts, 0.50),
        p75: percentile(&win_payouts, 0.75),
        p90: percentile(&win_payouts, 0.90),
        p95: percentile(&win_payouts, 0.95),
        p99: percentile(&win_payouts, 0.99),
    };

    // Collapsing all probability mass onto one winning outcome pins the RTP
    // to that outcome's payout, so the win range bounds the achievable RTP.
    let min_achievable_rtp = min_payout;
    let max_achievable_rtp = max_payout;

    let feasible = target_rtp >= min_achievable_rtp && target_rtp <= max_achievable_rtp;
    let (feasibility_note, suggested_rtp) = if feasible {
        (None, None)
    } else if target_rtp > max_achievable_rtp {
        (
            Some(format!(
                "Target RTP {:.2}% exceeds maximum achievable {:.2}% (max payout = {:.2}x)",
                target_rtp * 100.0,
                max_achievable_rtp * 100.0,
                max_payout
            )),
            Some(max_achievable_rtp * 0.95),
        )
    } else {
        (
            Some(format!(
                "Target RTP {:.2}% is below minimum achievable {:.2}% (min payout = {:.2}x)",
                target_rtp * 100.0,
                min_achievable_rtp * 100.0,
                min_payout
            )),
            Some(min_achievable_rtp * 1.05),
        )
    };

    let mode_type = classify_mode(target_rtp, max_payout / min_payout, table.cost);
    let recommended_buckets = recommend_buckets(&win_payouts, mode_type);

    Ok(ModeAnalysis {
        mode: table.mode.clone(),
        mode_type,
        total_outcomes: n,
        min_payout,
        max_payout,
        avg_payout,
        payout_variance,
        payout_std_dev,
        percentiles,
        min_achievable_rtp,
        max_achievable_rtp,
        cost: table.cost,
        is_bonus_mode: table.cost > 1.5,
        recommended_buckets,
        feasible,
        feasibility_note,
        suggested_rtp,
    })
}

/// Percentile by index `floor((n - 1) * p)` on a sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * p) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn classify_mode(target_rtp: f64, payout_range: f64, cost: f64) -> ModeType {
    if target_rtp > 10.0 {
        return ModeType::Extreme;
    }
    if target_rtp > 2.0 {
        return ModeType::HighRtp;
    }
    if cost > 1.5 {
        return if payout_range < 10.0 {
            ModeType::BonusNarrow
        } else {
            ModeType::BonusWide
        };
    }
    ModeType::Standard
}

/// Cut the sorted win distribution at class-specific percentile points and
/// turn each slice into a recommendation.
fn recommend_buckets(sorted_wins: &[f64], mode_type: ModeType) -> Vec<BucketRecommendation> {
    let (cuts, descriptions): (&[f64], &[&str]) = match mode_type {
        ModeType::Extreme | ModeType::HighRtp => (
            &[0.0, 0.5, 0.8, 0.95, 1.0],
            &["low_payouts", "medium_payouts", "high_payouts", "jackpot"],
        ),
        ModeType::BonusNarrow => (
            &[0.0, 0.33, 0.67, 1.0],
            &["below_avg", "around_avg", "above_avg"],
        ),
        ModeType::BonusWide => (
            &[0.0, 0.25, 0.5, 0.75, 0.9, 1.0],
            &["low", "low_medium", "medium", "high", "jackpot"],
        ),
        ModeType::Standard => (
            &[0.0, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99, 1.0],
            &[
                "small",
                "low_medium",
                "medium",
                "medium_high",
                "large",
                "huge",
                "jackpot",
            ],
        ),
    };

    let n = sorted_wins.len();
    let mut buckets: Vec<BucketRecommendation> = Vec::new();
    let mut total_capacity = 0.0f64;

    for i in 0..cuts.len() - 1 {
        let start = (n as f64 * cuts[i]) as usize;
        let end = ((n as f64 * cuts[i + 1]) as usize).min(n);
        if start >= end {
            continue;
        }

        let mut min_payout = sorted_wins[start];
        let mut max_payout = sorted_wins[end - 1];

        // Close any gap against the previous bucket's upper edge.
        if let Some(prev) = buckets.last() {
            if min_payout > prev.max_payout {
                min_payout = prev.max_payout;
            }
        }

        // Stretch the last bucket 1% past the max to guarantee inclusion.
        if i == cuts.len() - 2 {
            max_payout = sorted_wins[n - 1] * 1.01;
        }

        let slice = &sorted_wins[start..end];
        let avg_payout = slice.iter().sum::<f64>() / slice.len() as f64;
        let rtp_capacity = avg_payout;

        buckets.push(BucketRecommendation {
            min_payout,
            max_payout,
            outcome_count: slice.len(),
            rtp_capacity,
            avg_payout,
            suggested_rtp: 0.0,
            description: descriptions.get(i).copied().unwrap_or("bucket").to_string(),
        });

        total_capacity += rtp_capacity * slice.len() as f64;
    }

    if total_capacity > 0.0 {
        for bucket in &mut buckets {
            let share =
                bucket.rtp_capacity * bucket.outcome_count as f64 / total_capacity;
            bucket.suggested_rtp = share * 100.0;
        }
    }

    buckets
}

/// A bucket that could be voided to pull an infeasibly-low target in reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidSuggestion {
    pub index: usize,
    pub name: String,
    pub min_payout: f64,
    pub max_payout: f64,
    pub outcome_count: usize,
    /// Estimated RTP contribution, as a percentage.
    pub rtp_contribution: f64,
    /// 1 = void first.
    pub priority: usize,
}

/// Order buckets highest-average-payout-first and take them until their
/// cumulative estimated contribution covers `min_achievable_rtp - target`.
pub fn void_suggestions(
    buckets: &[BucketConfig],
    payouts: &[f64],
    target_rtp: f64,
    min_achievable_rtp: f64,
) -> Vec<VoidSuggestion> {
    if min_achievable_rtp <= target_rtp || payouts.is_empty() {
        return Vec::new();
    }

    let rtp_to_remove = min_achievable_rtp - target_rtp;

    struct Info<'a> {
        config: &'a BucketConfig,
        index: usize,
        rtp_contribution: f64,
        avg_payout: f64,
        count: usize,
    }

    let mut infos: Vec<Info> = Vec::new();
    for (i, bucket) in buckets.iter().enumerate() {
        let in_bucket: Vec<f64> = payouts
            .iter()
            .copied()
            .filter(|&p| p >= bucket.min_payout && p < bucket.max_payout)
            .collect();
        if in_bucket.is_empty() {
            continue;
        }
        let avg = in_bucket.iter().sum::<f64>() / in_bucket.len() as f64;
        infos.push(Info {
            config: bucket,
            index: i,
            // Uniform-distribution estimate; the real figure depends on the
            // final weights.
            rtp_contribution: avg / payouts.len() as f64,
            avg_payout: avg,
            count: in_bucket.len(),
        });
    }

    infos.sort_by(|a, b| b.avg_payout.total_cmp(&a.avg_payout));

    let mut suggestions = Vec::new();
    let mut removed = 0.0f64;
    for (priority, info) in infos.iter().enumerate() {
        if removed >= rtp_to_remove {
            break;
        }
        suggestions.push(VoidSuggestion {
            index: info.index,
            name: info.config.name.clone(),
            min_payout: info.config.min_payout,
            max_payout: info.config.max_payout,
            outcome_count: info.count,
            rtp_contribution: info.rtp_contribution * 100.0,
            priority: priority + 1,
        });
        removed += info.rtp_contribution;
    }

    suggestions
}

/// Turn an analysis into concrete bucket configs for a volatility profile.
///
/// Extreme and high-RTP modes lean on auto buckets with the profile's
/// exponent; bonus modes use RTP shares; standard modes use frequency
/// constraints on the lower half of the ladder where the implied frequency
/// stays reasonable.
pub fn create_buckets_from_analysis(
    analysis: &ModeAnalysis,
    target_rtp: f64,
    profile: PlayerProfile,
) -> Vec<BucketConfig> {
    let recs = &analysis.recommended_buckets;
    if recs.is_empty() {
        return Vec::new();
    }

    let modifiers = volatility_modifiers(profile, recs.len());
    let total_modified: f64 = recs
        .iter()
        .zip(&modifiers)
        .map(|(rec, m)| rec.suggested_rtp * m)
        .sum();
    if total_modified <= 0.0 {
        return Vec::new();
    }

    recs.iter()
        .zip(&modifiers)
        .enumerate()
        .map(|(i, (rec, modifier))| {
            let adjusted_share = rec.suggested_rtp * modifier / total_modified * 100.0;
            let constraint = match analysis.mode_type {
                ModeType::Extreme | ModeType::HighRtp => BucketConstraint::Auto {
                    auto_exponent: profile.auto_exponent(),
                },
                ModeType::BonusNarrow | ModeType::BonusWide => BucketConstraint::RtpPercent {
                    rtp_percent: adjusted_share,
                },
                ModeType::Standard => {
                    standard_constraint(rec, adjusted_share, target_rtp, i, recs.len())
                }
            };

            BucketConfig {
                name: rec.description.clone(),
                min_payout: rec.min_payout,
                max_payout: rec.max_payout,
                constraint,
                is_maxwin_bucket: false,
            }
        })
        .collect()
}

fn standard_constraint(
    rec: &BucketRecommendation,
    adjusted_share: f64,
    target_rtp: f64,
    index: usize,
    total: usize,
) -> BucketConstraint {
    // Lower half of the ladder: prefer a frequency constraint while the
    // implied frequency is tighter than 1 in 200.
    if index < total / 2 && rec.avg_payout > 0.0 {
        let rtp_contribution = adjusted_share / 100.0 * target_rtp;
        let prob = rtp_contribution / rec.avg_payout;
        if prob > 0.0 {
            let freq = 1.0 / prob;
            if freq < 200.0 {
                return BucketConstraint::Frequency {
                    frequency: ((freq * 10.0).round() / 10.0).max(1.0),
                };
            }
        }
    }
    BucketConstraint::RtpPercent {
        rtp_percent: adjusted_share,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;
    use crate::optimizer::config::validate_buckets;

    fn table(cost: f64, payout_cents: &[u64]) -> LookupTable {
        let outcomes = payout_cents
            .iter()
            .enumerate()
            .map(|(i, &cents)| Outcome::new(i as i64, cents, 1))
            .collect();
        LookupTable::new("base", cost, outcomes)
    }

    #[test]
    fn empty_and_winless_tables_are_rejected() {
        let empty = LookupTable::new("base", 1.0, Vec::new());
        assert!(matches!(
            analyze_table(&empty, 0.96),
            Err(OptimizerError::EmptyTable)
        ));

        let losses = table(1.0, &[0, 0, 0]);
        assert!(matches!(
            analyze_table(&losses, 0.96),
            Err(OptimizerError::NoWinners)
        ));
    }

    #[test]
    fn bounds_come_from_the_win_range() {
        let t = table(1.0, &[0, 50, 200, 1000]);
        let analysis = analyze_table(&t, 0.96).unwrap();
        assert!((analysis.min_achievable_rtp - 0.5).abs() < 1e-12);
        assert!((analysis.max_achievable_rtp - 10.0).abs() < 1e-12);
        assert!(analysis.feasible);
    }

    #[test]
    fn infeasible_high_target_suggests_95_percent_of_max() {
        // Winning payouts {0.2, 0.4, 0.6}; target 1.0.
        let t = table(1.0, &[0, 20, 40, 60]);
        let analysis = analyze_table(&t, 1.0).unwrap();

        assert!(!analysis.feasible);
        let suggested = analysis.suggested_rtp.unwrap();
        assert!((suggested - 0.57).abs() < 1e-9);
        assert!(analysis
            .feasibility_note
            .as_deref()
            .unwrap()
            .contains("exceeds maximum"));
    }

    #[test]
    fn infeasible_low_target_suggests_105_percent_of_min() {
        let t = table(1.0, &[0, 200, 400]);
        let analysis = analyze_table(&t, 0.5).unwrap();
        assert!(!analysis.feasible);
        assert!((analysis.suggested_rtp.unwrap() - 2.0 * 1.05).abs() < 1e-9);
    }

    #[test]
    fn classification_ladder() {
        assert_eq!(classify_mode(15.0, 5.0, 1.0), ModeType::Extreme);
        assert_eq!(classify_mode(3.0, 5.0, 1.0), ModeType::HighRtp);
        assert_eq!(classify_mode(0.96, 5.0, 2.0), ModeType::BonusNarrow);
        assert_eq!(classify_mode(0.96, 50.0, 2.0), ModeType::BonusWide);
        assert_eq!(classify_mode(0.96, 50.0, 1.0), ModeType::Standard);
    }

    #[test]
    fn percentiles_use_floor_index() {
        let sorted: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        // (n-1)*p = 9*0.5 = 4.5 -> idx 4 -> value 5.0
        assert_eq!(percentile(&sorted, 0.5), 5.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 10.0);
    }

    #[test]
    fn recommendations_are_gap_free_and_cover_the_max() {
        let cents: Vec<u64> = (1..=100).map(|i| i * 10).collect();
        let t = table(1.0, &cents);
        let analysis = analyze_table(&t, 0.96).unwrap();

        let recs = &analysis.recommended_buckets;
        assert!(!recs.is_empty());
        for pair in recs.windows(2) {
            assert!(pair[1].min_payout <= pair[0].max_payout + 1e-12);
        }
        let last = recs.last().unwrap();
        assert!(last.max_payout >= analysis.max_payout);

        let share_sum: f64 = recs.iter().map(|r| r.suggested_rtp).sum();
        assert!((share_sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn void_suggestions_order_by_avg_payout() {
        let buckets = vec![
            BucketConfig::frequency("low", 0.0, 2.0, 5.0),
            BucketConfig::frequency("high", 2.0, 100.0, 50.0),
        ];
        let payouts = [0.5, 1.0, 10.0, 50.0];

        let suggestions = void_suggestions(&buckets, &payouts, 0.1, 15.0);
        assert!(!suggestions.is_empty());
        assert_eq!(suggestions[0].name, "high");
        assert_eq!(suggestions[0].priority, 1);
    }

    #[test]
    fn created_buckets_validate_for_every_profile() {
        let cents: Vec<u64> = (1..=60).map(|i| i * 25).collect();
        let t = table(1.0, &cents);
        let analysis = analyze_table(&t, 0.96).unwrap();

        for profile in PlayerProfile::all() {
            let buckets = create_buckets_from_analysis(&analysis, 0.96, profile);
            assert!(!buckets.is_empty());
            assert!(validate_buckets(&buckets).is_ok(), "{profile:?}");
        }
    }

    #[test]
    fn extreme_modes_get_auto_buckets() {
        let t = table(1.0, &[0, 500, 2000, 8000]);
        let analysis = analyze_table(&t, 12.0).unwrap();
        assert_eq!(analysis.mode_type, ModeType::Extreme);

        let buckets =
            create_buckets_from_analysis(&analysis, 12.0, PlayerProfile::MediumVolatility);
        assert!(buckets
            .iter()
            .all(|b| matches!(b.constraint, BucketConstraint::Auto { .. })));
    }
}
