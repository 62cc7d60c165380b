use crate::{
    error::{SeedError, SeedResult},
    types::Tier,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LengthRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub points_per_meter: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { points_per_meter: 10.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Distance ceiling used when the client does not send one.
    pub max_distance: u32,
    /// Lifetime of a cached seed entry. Zero makes entries unreadable.
    pub seed_ttl_hours: i64,
    /// Purge expired cache entries after this many writes. Zero disables it.
    pub purge_every_writes: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_distance: 10_000,
            seed_ttl_hours: 24,
            purge_every_writes: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub tier_lengths: BTreeMap<Tier, LengthRange>,
    pub shop_count_range: (u32, u32),
    /// Fraction of the piece list shops are spread across.
    pub shop_position_range: (f64, f64),
    pub shop_item_count: (u32, u32),
    pub boss_reward_count: (u32, u32),
    /// Cost of the n-th reroll; the last rung repeats.
    pub reroll_costs: Vec<u32>,
    /// Raw piece length per normalized length unit.
    pub length_unit_divisor: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            tier_lengths: [
                (1, LengthRange { min: 500, max: 600 }),
                (2, LengthRange { min: 600, max: 800 }),
                (3, LengthRange { min: 1000, max: 1500 }),
            ]
            .into(),
            shop_count_range: (1, 2),
            shop_position_range: (0.5, 0.7),
            shop_item_count: (3, 5),
            boss_reward_count: (3, 5),
            reroll_costs: vec![50, 100, 150, 200],
            length_unit_divisor: 800.0,
        }
    }
}

impl TrackConfig {
    pub fn tier_length(&self, tier: Tier) -> SeedResult<LengthRange> {
        self.tier_lengths
            .get(&tier)
            .copied()
            .ok_or(SeedError::InvalidTier { tier })
    }

    pub fn reroll_cost(&self, reroll_index: u32) -> u32 {
        let last = self.reroll_costs.len().saturating_sub(1);
        self.reroll_costs
            .get((reroll_index as usize).min(last))
            .copied()
            .unwrap_or(0)
    }
}

/// Every bound check can be switched off on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub check_score: bool,
    pub check_distance: bool,
    pub check_coins: bool,
    pub check_obstacles: bool,
    pub check_track_pieces: bool,
    pub check_powerups: bool,
    pub check_track_selections: bool,
    pub check_player_class: bool,
    /// Score may reach distance * points_per_meter * this.
    pub score_ceiling_multiplier: f64,
    /// Rerolls per shop whose items count toward the powerup bound.
    pub reroll_allowance_per_shop: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            check_score: true,
            check_distance: true,
            check_coins: true,
            check_obstacles: true,
            check_track_pieces: true,
            check_powerups: true,
            check_track_selections: true,
            check_player_class: true,
            score_ceiling_multiplier: 5.0,
            reroll_allowance_per_shop: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub scoring: ScoringConfig,
    pub runs: RunConfig,
    pub tracks: TrackConfig,
    pub validation: ValidationConfig,
}

impl SeedConfig {
    /// Load from the data/ directory.
    /// Missing sections and keys fall back to the production defaults.
    /// In tests, use SeedConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/game_config.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SeedConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.tracks.length_unit_divisor > 0.0,
            "tracks.length_unit_divisor must be positive"
        );
        let (lo, hi) = self.tracks.shop_position_range;
        anyhow::ensure!(
            (0.0..=1.0).contains(&lo) && (0.0..=1.0).contains(&hi) && lo <= hi,
            "tracks.shop_position_range must be an ordered pair within [0, 1]"
        );
        for tier in crate::types::tiers() {
            let range = self
                .tracks
                .tier_lengths
                .get(&tier)
                .ok_or_else(|| anyhow::anyhow!("tracks.tier_lengths is missing tier {tier}"))?;
            anyhow::ensure!(range.min <= range.max, "tier {tier} length range is reversed");
        }
        anyhow::ensure!(self.runs.seed_ttl_hours >= 0, "runs.seed_ttl_hours must not be negative");
        Ok(())
    }

    /// Config with fixed ranges for use in tests.
    pub fn default_test() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            runs: RunConfig {
                max_distance: 10_000,
                seed_ttl_hours: 24,
                purge_every_writes: 100,
            },
            tracks: TrackConfig {
                tier_lengths: [
                    (1, LengthRange { min: 6, max: 8 }),
                    (2, LengthRange { min: 8, max: 10 }),
                    (3, LengthRange { min: 10, max: 12 }),
                ]
                .into(),
                shop_count_range: (1, 2),
                shop_position_range: (0.5, 0.7),
                shop_item_count: (2, 3),
                boss_reward_count: (2, 2),
                reroll_costs: vec![50, 100, 150, 200],
                length_unit_divisor: 800.0,
            },
            validation: ValidationConfig::default(),
        }
    }
}
