//! Bucket and optimizer configuration: constraint variants, validation,
//! presets, and table-driven bucket suggestion.

use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;
use crate::model::LookupTable;

/// How a bucket's probability mass is specified.
///
/// Serialized flat next to the bucket fields, discriminated by `type`,
/// so the wire shape stays `{"name": .., "min_payout": .., "type": "frequency",
/// "frequency": 20}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BucketConstraint {
    /// "1 in N spins": target probability 1/N.
    Frequency { frequency: f64 },
    /// Bucket contributes X% of the target RTP.
    RtpPercent { rtp_percent: f64 },
    /// Share the RTP left over after all explicit buckets, distributed
    /// inversely proportional to payout^exponent.
    Auto {
        #[serde(default = "default_auto_exponent")]
        auto_exponent: f64,
    },
    /// Frequency of the maximum-win outcome inside a narrow max-payout bucket.
    MaxWinFreq { max_win_frequency: f64 },
    /// Explicit per-outcome frequency list.
    OutcomeFreq {
        #[serde(default)]
        outcome_frequencies: Vec<OutcomeFrequency>,
    },
}

fn default_auto_exponent() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeFrequency {
    pub sim_id: i64,
    pub frequency: f64,
}

/// A named payout range plus its probability constraint.
///
/// Covers normalized payouts `[min_payout, max_payout)`; the last bucket of a
/// sorted set is closed on the right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub name: String,
    pub min_payout: f64,
    pub max_payout: f64,
    #[serde(flatten)]
    pub constraint: BucketConstraint,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_maxwin_bucket: bool,
}

impl BucketConfig {
    pub fn frequency(name: &str, min: f64, max: f64, frequency: f64) -> Self {
        Self {
            name: name.to_string(),
            min_payout: min,
            max_payout: max,
            constraint: BucketConstraint::Frequency { frequency },
            is_maxwin_bucket: false,
        }
    }

    pub fn rtp_percent(name: &str, min: f64, max: f64, rtp_percent: f64) -> Self {
        Self {
            name: name.to_string(),
            min_payout: min,
            max_payout: max,
            constraint: BucketConstraint::RtpPercent { rtp_percent },
            is_maxwin_bucket: false,
        }
    }

    pub fn auto(name: &str, min: f64, max: f64, auto_exponent: f64) -> Self {
        Self {
            name: name.to_string(),
            min_payout: min,
            max_payout: max,
            constraint: BucketConstraint::Auto { auto_exponent },
            is_maxwin_bucket: false,
        }
    }
}

/// Full configuration for one optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub target_rtp: f64,
    pub rtp_tolerance: f64,
    pub buckets: Vec<BucketConfig>,
    pub min_weight: u64,
    pub max_iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_max_win_freq: Option<f64>,
    /// Legacy whole-bucket voiding, kept for protocol back-compat.
    #[serde(default)]
    pub enable_voiding: bool,
    #[serde(default)]
    pub voided_bucket_indices: Vec<usize>,
    /// Automatic per-outcome voiding when the target sits below the table's
    /// uniform-weight RTP floor.
    #[serde(default)]
    pub enable_auto_voiding: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            target_rtp: 0.97,
            rtp_tolerance: 0.001,
            buckets: default_buckets(),
            min_weight: 1,
            max_iterations: 1000,
            global_max_win_freq: None,
            enable_voiding: false,
            voided_bucket_indices: Vec::new(),
            enable_auto_voiding: false,
        }
    }
}

impl OptimizerConfig {
    /// Clamp obviously-broken fields to their documented defaults.
    pub fn normalized(mut self) -> Self {
        if self.min_weight < 1 {
            self.min_weight = 1;
        }
        if self.rtp_tolerance <= 0.0 {
            self.rtp_tolerance = 0.001;
        }
        if self.max_iterations == 0 {
            self.max_iterations = 1000;
        }
        self
    }

    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.target_rtp > 0.0 && self.target_rtp.is_finite()) {
            return Err(OptimizerError::InvalidRequest(
                "target_rtp must be a positive number".into(),
            ));
        }
        if self.rtp_tolerance < 0.0 {
            return Err(OptimizerError::InvalidRequest(
                "rtp_tolerance cannot be negative".into(),
            ));
        }
        if let Some(f) = self.global_max_win_freq {
            if f <= 0.0 {
                return Err(OptimizerError::InvalidRequest(
                    "global_max_win_freq must be > 0".into(),
                ));
            }
        }
        validate_buckets(&self.buckets)
    }
}

/// Validate a bucket list: gap-free, non-overlapping, sane parameter domains.
pub fn validate_buckets(buckets: &[BucketConfig]) -> Result<(), OptimizerError> {
    if buckets.is_empty() {
        return Err(OptimizerError::InvalidBuckets(
            "at least one bucket required".into(),
        ));
    }

    let mut sorted: Vec<&BucketConfig> = buckets.iter().collect();
    sorted.sort_by(|a, b| a.min_payout.total_cmp(&b.min_payout));

    for pair in sorted.windows(2) {
        let (cur, next) = (pair[0], pair[1]);
        if cur.max_payout < next.min_payout {
            return Err(OptimizerError::InvalidBuckets(format!(
                "gap between buckets: {:.2}-{:.2} and {:.2}-{:.2}",
                cur.min_payout, cur.max_payout, next.min_payout, next.max_payout
            )));
        }
        if cur.max_payout > next.min_payout {
            return Err(OptimizerError::InvalidBuckets(format!(
                "overlap between buckets: {:.2}-{:.2} and {:.2}-{:.2}",
                cur.min_payout, cur.max_payout, next.min_payout, next.max_payout
            )));
        }
    }

    for bucket in buckets {
        if bucket.min_payout < 0.0 {
            return Err(OptimizerError::InvalidBuckets(format!(
                "bucket {}: min_payout cannot be negative",
                bucket.name
            )));
        }
        if bucket.max_payout < bucket.min_payout {
            return Err(OptimizerError::InvalidBuckets(format!(
                "bucket {}: max_payout must be >= min_payout",
                bucket.name
            )));
        }

        match &bucket.constraint {
            BucketConstraint::Frequency { frequency } => {
                if *frequency <= 0.0 {
                    return Err(OptimizerError::InvalidBuckets(format!(
                        "bucket {}: frequency must be > 0",
                        bucket.name
                    )));
                }
            }
            BucketConstraint::RtpPercent { rtp_percent } => {
                if *rtp_percent <= 0.0 || *rtp_percent > 100.0 {
                    return Err(OptimizerError::InvalidBuckets(format!(
                        "bucket {}: rtp_percent must be between 0 and 100",
                        bucket.name
                    )));
                }
            }
            BucketConstraint::Auto { auto_exponent } => {
                if *auto_exponent < 0.0 {
                    return Err(OptimizerError::InvalidBuckets(format!(
                        "bucket {}: auto_exponent cannot be negative",
                        bucket.name
                    )));
                }
            }
            BucketConstraint::MaxWinFreq { max_win_frequency } => {
                if *max_win_frequency <= 0.0 {
                    return Err(OptimizerError::InvalidBuckets(format!(
                        "bucket {}: max_win_frequency must be > 0",
                        bucket.name
                    )));
                }
            }
            BucketConstraint::OutcomeFreq {
                outcome_frequencies,
            } => {
                if outcome_frequencies.iter().any(|f| f.frequency <= 0.0) {
                    return Err(OptimizerError::InvalidBuckets(format!(
                        "bucket {}: outcome frequencies must be > 0",
                        bucket.name
                    )));
                }
            }
        }
    }

    Ok(())
}

/// A sensible default ladder for standard slots.
pub fn default_buckets() -> Vec<BucketConfig> {
    vec![
        BucketConfig::frequency("sub_1x", 0.0, 1.0, 3.0),
        BucketConfig::frequency("small", 1.0, 5.0, 5.0),
        BucketConfig::frequency("medium", 5.0, 20.0, 25.0),
        BucketConfig::frequency("large", 20.0, 100.0, 100.0),
        BucketConfig::rtp_percent("huge", 100.0, 1000.0, 5.0),
        BucketConfig::rtp_percent("jackpot", 1000.0, 100_000.0, 0.5),
    ]
}

/// Named preset bucket sets for the UI.
pub fn bucket_presets() -> Vec<(&'static str, Vec<BucketConfig>)> {
    vec![
        ("default", default_buckets()),
        (
            "conservative",
            vec![
                BucketConfig::frequency("sub_1x", 0.01, 1.0, 2.5),
                BucketConfig::frequency("small", 1.0, 5.0, 4.0),
                BucketConfig::frequency("medium", 5.0, 20.0, 15.0),
                BucketConfig::frequency("large", 20.0, 100.0, 80.0),
                BucketConfig::rtp_percent("huge", 100.0, 1000.0, 8.0),
                BucketConfig::rtp_percent("jackpot", 1000.0, 100_000.0, 1.0),
            ],
        ),
        (
            "aggressive",
            vec![
                BucketConfig::frequency("sub_1x", 0.01, 1.0, 5.0),
                BucketConfig::frequency("small", 1.0, 5.0, 10.0),
                BucketConfig::frequency("medium", 5.0, 20.0, 50.0),
                BucketConfig::frequency("large", 20.0, 100.0, 200.0),
                BucketConfig::rtp_percent("huge", 100.0, 1000.0, 3.0),
                BucketConfig::rtp_percent("jackpot", 1000.0, 100_000.0, 0.3),
            ],
        ),
    ]
}

/// Suggest a bucket configuration from a table's actual payout range.
///
/// Bonus modes (cost > 1.5) get buckets clustered around the target RTP;
/// standard modes get the frequency/RTP ladder. The max win always ends up in
/// its own dedicated bucket for precise control.
pub fn suggest_buckets(table: &LookupTable, target_rtp: f64) -> Vec<BucketConfig> {
    let mut max_payout = 0.0f64;
    let mut min_payout = f64::MAX;
    for outcome in &table.outcomes {
        let payout = table.normalized_payout(outcome);
        if payout > max_payout {
            max_payout = payout;
        }
        if payout > 0.0 && payout < min_payout {
            min_payout = payout;
        }
    }

    if max_payout <= 0.0 {
        return Vec::new();
    }

    let buckets = if table.cost > 1.5 {
        suggest_bonus_buckets(max_payout, target_rtp)
    } else {
        suggest_standard_buckets(max_payout)
    };

    ensure_max_win_bucket(buckets, max_payout)
}

/// Give the max payout a dedicated bucket, splitting whichever bucket
/// currently contains it.
fn ensure_max_win_bucket(mut buckets: Vec<BucketConfig>, max_payout: f64) -> Vec<BucketConfig> {
    if buckets.is_empty() || max_payout <= 0.0 {
        return buckets;
    }

    let containing = buckets
        .iter()
        .position(|b| max_payout >= b.min_payout && max_payout <= b.max_payout);

    if let Some(idx) = containing {
        if buckets[idx].is_maxwin_bucket {
            return buckets;
        }
    }

    let epsilon = (max_payout * 0.001).max(0.01);
    let threshold = max_payout - epsilon;

    if let Some(idx) = containing {
        if buckets[idx].min_payout >= threshold {
            buckets[idx].is_maxwin_bucket = true;
            buckets[idx].name = "maxwin".into();
            return buckets;
        }
        buckets[idx].max_payout = threshold;
    }

    buckets.push(BucketConfig {
        name: "maxwin".into(),
        min_payout: threshold,
        max_payout: max_payout + 0.01,
        constraint: BucketConstraint::MaxWinFreq {
            max_win_frequency: 50_000.0,
        },
        is_maxwin_bucket: true,
    });
    buckets
}

/// Bonus modes cluster normalized payouts tightly around the target RTP.
fn suggest_bonus_buckets(max_payout: f64, target_rtp: f64) -> Vec<BucketConfig> {
    let mut buckets = Vec::new();

    let low_threshold = target_rtp * 0.8;
    buckets.push(BucketConfig::auto("below_avg", 0.0, low_threshold, 1.0));

    let mut mid_high = target_rtp * 1.2;
    if mid_high > max_payout {
        mid_high = max_payout * 0.9;
    }
    buckets.push(BucketConfig::auto("around_avg", low_threshold, mid_high, 1.0));

    if max_payout > mid_high {
        let mut high_threshold = target_rtp * 1.5;
        if high_threshold < mid_high {
            high_threshold = mid_high * 1.2;
        }
        if high_threshold > max_payout {
            high_threshold = max_payout + 0.01;
        }

        buckets.push(BucketConfig::rtp_percent(
            "above_avg",
            mid_high,
            high_threshold,
            15.0,
        ));

        if max_payout > high_threshold {
            buckets.push(BucketConfig::rtp_percent(
                "jackpot",
                high_threshold,
                max_payout + 0.01,
                5.0,
            ));
        }
    }

    buckets
}

/// Standard-mode ladder, rung by rung up to the table's actual max payout.
pub(crate) fn suggest_standard_buckets(max_payout: f64) -> Vec<BucketConfig> {
    struct Rung {
        name: &'static str,
        min: f64,
        max: f64,
        needs_max: f64,
        frequency: Option<f64>,
        rtp_percent: Option<f64>,
    }

    let rungs = [
        Rung { name: "sub_1x", min: 0.01, max: 1.0, needs_max: 0.0, frequency: Some(3.0), rtp_percent: None },
        Rung { name: "breakeven", min: 1.0, max: 2.0, needs_max: 2.0, frequency: Some(5.0), rtp_percent: None },
        Rung { name: "small", min: 2.0, max: 5.0, needs_max: 5.0, frequency: Some(8.0), rtp_percent: None },
        Rung { name: "low_med", min: 5.0, max: 10.0, needs_max: 10.0, frequency: Some(15.0), rtp_percent: None },
        Rung { name: "medium", min: 10.0, max: 25.0, needs_max: 25.0, frequency: Some(30.0), rtp_percent: None },
        Rung { name: "med_high", min: 25.0, max: 50.0, needs_max: 50.0, frequency: Some(60.0), rtp_percent: None },
        Rung { name: "high", min: 50.0, max: 100.0, needs_max: 100.0, frequency: Some(100.0), rtp_percent: None },
        Rung { name: "very_high", min: 100.0, max: 250.0, needs_max: 250.0, frequency: None, rtp_percent: Some(3.0) },
        Rung { name: "huge", min: 250.0, max: 500.0, needs_max: 500.0, frequency: None, rtp_percent: Some(2.0) },
        Rung { name: "massive", min: 500.0, max: 1000.0, needs_max: 1000.0, frequency: None, rtp_percent: Some(1.0) },
        Rung { name: "epic", min: 1000.0, max: 2500.0, needs_max: 2500.0, frequency: None, rtp_percent: Some(0.5) },
    ];

    let mut buckets: Vec<BucketConfig> = rungs
        .iter()
        .filter(|r| max_payout >= r.needs_max)
        .map(|r| match (r.frequency, r.rtp_percent) {
            (Some(f), _) => BucketConfig::frequency(r.name, r.min, r.max, f),
            (_, Some(pct)) => BucketConfig::rtp_percent(r.name, r.min, r.max, pct),
            _ => unreachable!(),
        })
        .collect();

    if max_payout >= 2500.0 {
        buckets.push(BucketConfig::rtp_percent(
            "jackpot",
            2500.0,
            max_payout + 1.0,
            0.3,
        ));
    } else if max_payout >= 1000.0 {
        buckets.push(BucketConfig::rtp_percent(
            "jackpot",
            1000.0,
            max_payout + 1.0,
            0.5,
        ));
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Outcome;

    fn freq(name: &str, min: f64, max: f64) -> BucketConfig {
        BucketConfig::frequency(name, min, max, 10.0)
    }

    #[test]
    fn gap_is_rejected() {
        let buckets = vec![freq("a", 0.0, 1.0), freq("b", 2.0, 5.0)];
        let err = validate_buckets(&buckets).unwrap_err();
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn overlap_is_rejected() {
        let buckets = vec![freq("a", 0.0, 2.0), freq("b", 1.0, 5.0)];
        let err = validate_buckets(&buckets).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn domain_violations_are_rejected() {
        let bad_freq = vec![BucketConfig::frequency("a", 0.0, 1.0, 0.0)];
        assert!(validate_buckets(&bad_freq).is_err());

        let bad_pct = vec![BucketConfig::rtp_percent("a", 0.0, 1.0, 150.0)];
        assert!(validate_buckets(&bad_pct).is_err());

        let bad_exp = vec![BucketConfig::auto("a", 0.0, 1.0, -1.0)];
        assert!(validate_buckets(&bad_exp).is_err());

        let inverted = vec![freq("a", 5.0, 1.0)];
        assert!(validate_buckets(&inverted).is_err());
    }

    #[test]
    fn validation_is_idempotent() {
        let buckets = default_buckets();
        assert!(validate_buckets(&buckets).is_ok());
        assert!(validate_buckets(&buckets).is_ok());

        let broken = vec![freq("a", 0.0, 1.0), freq("b", 3.0, 5.0)];
        let first = validate_buckets(&broken).unwrap_err().to_string();
        let second = validate_buckets(&broken).unwrap_err().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn constraint_wire_shape_is_flat() {
        let bucket = BucketConfig::frequency("small", 1.0, 5.0, 20.0);
        let json = serde_json::to_value(&bucket).unwrap();
        assert_eq!(json["type"], "frequency");
        assert_eq!(json["frequency"], 20.0);
        assert_eq!(json["min_payout"], 1.0);

        let parsed: BucketConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, bucket);
    }

    #[test]
    fn suggested_buckets_cover_and_validate() {
        let outcomes: Vec<Outcome> = [0u64, 50, 150, 800, 2500, 12_000, 480_000]
            .iter()
            .enumerate()
            .map(|(i, &cents)| Outcome::new(i as i64, cents, 1))
            .collect();
        let table = LookupTable::new("base", 1.0, outcomes);

        let buckets = suggest_buckets(&table, 0.96);
        assert!(!buckets.is_empty());
        assert!(validate_buckets(&buckets).is_ok());
        assert!(buckets.iter().any(|b| b.is_maxwin_bucket));

        // Every winning payout must land inside some bucket.
        let max = buckets
            .iter()
            .map(|b| b.max_payout)
            .fold(f64::MIN, f64::max);
        assert!(max >= 4800.0);
    }

    #[test]
    fn bonus_mode_gets_auto_buckets() {
        let outcomes: Vec<Outcome> = [0u64, 8_000, 19_000, 30_000]
            .iter()
            .enumerate()
            .map(|(i, &cents)| Outcome::new(i as i64, cents, 1))
            .collect();
        let table = LookupTable::new("bonus", 100.0, outcomes);

        let buckets = suggest_buckets(&table, 0.95);
        assert!(buckets
            .iter()
            .any(|b| matches!(b.constraint, BucketConstraint::Auto { .. })));
        assert!(validate_buckets(&buckets).is_ok());
    }
}
