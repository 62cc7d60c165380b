//! Run validator: checks a submitted run against its seed's bounds.
//!
//! RULE: validation never rejects a run outright. A run whose seed is gone
//! is invalid; a run that breaks a bound is valid but suspicious, with
//! every failed check listed.
//!
//! The run hash identifies duplicate submissions. It covers only fields
//! the client cannot vary between honest resubmissions.

use crate::{
    error::{SeedError, SeedResult},
    run_seed::{RunBounds, RunSeedService, SeedEntry},
    types::{TIER_COUNT, TRACKS_PER_TIER},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SEED_INVALID: &str = "Seed expired or invalid";

/// What the client reports at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSubmission {
    pub score: i64,
    pub distance: i64,
    pub duration_seconds: i64,
    pub coins_collected: i64,
    pub obstacles_hit: i64,
    pub powerups_used: i64,
    pub track_pieces_spawned: i64,
    /// Track chosen in each tier, tier 1 first.
    pub selected_track_indices: Option<Vec<u8>>,
    pub is_endless: bool,
    pub is_complete: bool,
    pub player_class: Option<String>,
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub suspicious: bool,
    pub errors: Vec<String>,
    pub run_hash: String,
}

/// Field order here is the hash's canonical order.
#[derive(Serialize)]
struct HashInput<'a> {
    seed_id: &'a str,
    score: i64,
    distance: i64,
    duration_seconds: i64,
    coins_collected: i64,
    started_at: Option<&'a str>,
}

/// Lowercase hex SHA-256 over the canonical JSON of the identifying fields.
pub fn run_hash(seed_id: &str, submission: &RunSubmission) -> SeedResult<String> {
    let canonical = serde_json::to_string(&HashInput {
        seed_id,
        score: submission.score,
        distance: submission.distance,
        duration_seconds: submission.duration_seconds,
        coins_collected: submission.coins_collected,
        started_at: submission.started_at.as_deref(),
    })?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

pub struct RunValidator<'s, 'a> {
    service: &'s RunSeedService<'a>,
}

impl<'s, 'a> RunValidator<'s, 'a> {
    pub fn new(service: &'s RunSeedService<'a>) -> Self {
        Self { service }
    }

    pub fn validate(&self, submission: &RunSubmission, seed_id: &str) -> SeedResult<ValidationReport> {
        let run_hash = run_hash(seed_id, submission)?;
        let entry = match self.service.get_seed_data(seed_id) {
            Ok(entry) => entry,
            Err(SeedError::SeedNotFound { .. }) => {
                log::info!("validation: seed {seed_id} expired or unknown");
                return Ok(ValidationReport {
                    valid: false,
                    suspicious: false,
                    errors: vec![SEED_INVALID.to_string()],
                    run_hash,
                });
            }
            Err(e) => return Err(e),
        };

        let errors = self.check(submission, &entry)?;
        let suspicious = !errors.is_empty();
        if suspicious {
            log::warn!("validation: run on seed {seed_id} is suspicious: {}", errors.join("; "));
        }
        Ok(ValidationReport {
            valid: true,
            suspicious,
            errors,
            run_hash,
        })
    }

    fn check(&self, run: &RunSubmission, entry: &SeedEntry) -> SeedResult<Vec<String>> {
        let config = self.service.config();
        let checks = &config.validation;
        let mut errors = Vec::new();

        if checks.check_score {
            let ceiling = run.distance.max(0) as f64
                * config.scoring.points_per_meter
                * checks.score_ceiling_multiplier;
            if run.score as f64 > ceiling {
                errors.push(format!(
                    "Score {} exceeds the maximum of {ceiling:.0} for distance {}",
                    run.score, run.distance
                ));
            }
        }

        if checks.check_player_class {
            if let Some(class) = run.player_class.as_deref() {
                if !class.eq_ignore_ascii_case(&entry.player_class) {
                    errors.push(format!(
                        "Player class {class} does not match seed class {}",
                        entry.player_class
                    ));
                }
            }
        }

        // Endless runs outlive the seed's content tree.
        if run.is_endless {
            return Ok(errors);
        }

        if checks.check_distance && run.distance > i64::from(entry.max_distance) {
            errors.push(format!(
                "Distance {} exceeds the maximum of {}",
                run.distance, entry.max_distance
            ));
        }

        let mut selection_ok = true;
        if let Some(selected) = &run.selected_track_indices {
            if selected.len() > usize::from(TIER_COUNT) {
                selection_ok = false;
                if checks.check_track_selections {
                    errors.push(format!(
                        "{} track selections exceed the {TIER_COUNT} tiers of a run",
                        selected.len()
                    ));
                }
            }
            for (tier, &index) in (1u8..).zip(selected) {
                if index >= TRACKS_PER_TIER {
                    selection_ok = false;
                    if checks.check_track_selections {
                        errors.push(format!("Track index {index} in tier {tier} is out of range"));
                    }
                }
            }
        }

        let bounds = match &run.selected_track_indices {
            Some(selected) if selection_ok && !selected.is_empty() => {
                self.service.bounds_for_selection(entry, selected)?
            }
            _ => entry.bounds,
        };
        errors.extend(bound_errors(run, &bounds, checks));
        Ok(errors)
    }
}

fn bound_errors(
    run: &RunSubmission,
    bounds: &RunBounds,
    checks: &crate::config::ValidationConfig,
) -> Vec<String> {
    let rows = [
        (checks.check_coins, "Coins collected", run.coins_collected, bounds.max_coins),
        (checks.check_obstacles, "Obstacles hit", run.obstacles_hit, bounds.max_obstacles),
        (
            checks.check_track_pieces,
            "Track pieces spawned",
            run.track_pieces_spawned,
            bounds.max_track_pieces,
        ),
        (checks.check_powerups, "Powerups used", run.powerups_used, bounds.max_powerups),
    ];
    rows.into_iter()
        .filter(|&(enabled, _, value, max)| enabled && value > i64::from(max))
        .map(|(_, label, value, max)| format!("{label} {value} exceeds the maximum of {max}"))
        .collect()
}
