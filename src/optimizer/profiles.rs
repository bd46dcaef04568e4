//! Player-volatility profiles and the bucket-configuration generator.
//!
//! A profile shifts probability mass along the payout ladder: low volatility
//! favors frequent small wins, high volatility feeds the jackpot tiers.

use serde::{Deserialize, Serialize};

use crate::optimizer::config::{
    suggest_standard_buckets, validate_buckets, BucketConfig, BucketConstraint,
};
use crate::error::OptimizerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerProfile {
    LowVolatility,
    MediumVolatility,
    HighVolatility,
}

impl Default for PlayerProfile {
    fn default() -> Self {
        PlayerProfile::MediumVolatility
    }
}

impl PlayerProfile {
    pub fn all() -> [PlayerProfile; 3] {
        [
            PlayerProfile::LowVolatility,
            PlayerProfile::MediumVolatility,
            PlayerProfile::HighVolatility,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerProfile::LowVolatility => "Low Volatility",
            PlayerProfile::MediumVolatility => "Medium Volatility",
            PlayerProfile::HighVolatility => "High Volatility",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PlayerProfile::LowVolatility => {
                "Frequent small wins, rare big payouts. Steady sessions with low swing."
            }
            PlayerProfile::MediumVolatility => {
                "Balanced win distribution across all payout tiers."
            }
            PlayerProfile::HighVolatility => {
                "Rare wins, heavy jackpot weighting. Long droughts, big spikes."
            }
        }
    }

    /// Auto-bucket exponent: steeper suppresses high payouts harder.
    pub fn auto_exponent(&self) -> f64 {
        match self {
            PlayerProfile::LowVolatility => 1.5,
            PlayerProfile::MediumVolatility => 1.0,
            PlayerProfile::HighVolatility => 0.5,
        }
    }
}

/// Per-bucket RTP-share multipliers for a profile, normalized to sum to
/// `num_buckets`. Index 0 is the lowest payout bucket.
pub fn volatility_modifiers(profile: PlayerProfile, num_buckets: usize) -> Vec<f64> {
    let mut modifiers: Vec<f64> = (0..num_buckets)
        .map(|i| match profile {
            PlayerProfile::LowVolatility => 0.7f64.powi(i as i32),
            PlayerProfile::HighVolatility => 1.3f64.powi(i as i32),
            PlayerProfile::MediumVolatility => 1.0,
        })
        .collect();

    let sum: f64 = modifiers.iter().sum();
    if sum > 0.0 {
        for m in &mut modifiers {
            *m = *m / sum * num_buckets as f64;
        }
    }
    modifiers
}

/// A generated bucket configuration for one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedConfig {
    pub profile: PlayerProfile,
    pub name: String,
    pub description: String,
    pub target_rtp: f64,
    pub max_win: f64,
    pub buckets: Vec<BucketConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedConfigSet {
    pub target_rtp: f64,
    pub max_win: f64,
    pub configs: Vec<GeneratedConfig>,
}

/// Template-based bucket configuration generator.
#[derive(Debug, Default)]
pub struct ConfigGenerator;

impl ConfigGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate the standard ladder scaled to a volatility profile.
    pub fn generate_config(
        &self,
        target_rtp: f64,
        max_win: f64,
        profile: PlayerProfile,
    ) -> GeneratedConfig {
        let mut buckets = suggest_standard_buckets(max_win);

        // Low volatility: more frequent low-tier hits, thinner top tiers.
        // High volatility: the inverse.
        let (freq_factor, rtp_factor) = match profile {
            PlayerProfile::LowVolatility => (0.75, 0.6),
            PlayerProfile::MediumVolatility => (1.0, 1.0),
            PlayerProfile::HighVolatility => (1.5, 1.5),
        };

        for bucket in &mut buckets {
            match &mut bucket.constraint {
                BucketConstraint::Frequency { frequency } => {
                    *frequency = ((*frequency * freq_factor * 10.0).round() / 10.0).max(1.0);
                }
                BucketConstraint::RtpPercent { rtp_percent } => {
                    *rtp_percent = (*rtp_percent * rtp_factor).min(100.0);
                }
                _ => {}
            }
        }

        GeneratedConfig {
            profile,
            name: profile.display_name().to_string(),
            description: profile.description().to_string(),
            target_rtp,
            max_win,
            buckets,
        }
    }

    /// Generate all three profiles at once.
    pub fn generate_all_profiles(&self, target_rtp: f64, max_win: f64) -> GeneratedConfigSet {
        GeneratedConfigSet {
            target_rtp,
            max_win,
            configs: PlayerProfile::all()
                .into_iter()
                .map(|p| self.generate_config(target_rtp, max_win, p))
                .collect(),
        }
    }
}

/// Generated configs must pass the same validation as client-supplied ones.
pub fn validate_generated_config(config: &GeneratedConfig) -> Result<(), OptimizerError> {
    validate_buckets(&config.buckets)
}
