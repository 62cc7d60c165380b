use chrono::{Duration, TimeZone, Utc};
use runseed_core::{
    catalog::ContentLibrary,
    clock::ManualClock,
    config::SeedConfig,
    run_seed::{NewRun, RunSeedService, SeedEntry},
    seed_cache::MemoryCache,
    validation::{run_hash, RunSubmission, RunValidator, SEED_INVALID},
};

// ── Test helpers ────────────────────────────────────────────────────────────

struct Fixture {
    config: SeedConfig,
    library: ContentLibrary,
    cache: MemoryCache,
    clock: ManualClock,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(SeedConfig::default_test())
    }

    fn with_config(config: SeedConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            config,
            library: ContentLibrary::default_test(),
            cache: MemoryCache::new(),
            clock: ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()),
        }
    }

    fn service(&self) -> RunSeedService<'_> {
        RunSeedService::new(&self.config, &self.library, &self.cache, &self.clock)
    }
}

fn start(service: &RunSeedService<'_>) -> SeedEntry {
    let run = NewRun {
        max_distance: Some(5_000),
        player_class: Some("Vanilla".into()),
        ..NewRun::default()
    };
    service.generate_with_seed(4_242, &run).unwrap()
}

/// A short run that stays inside every bound of `entry`.
fn honest_run(entry: &SeedEntry) -> RunSubmission {
    assert!(entry.bounds.max_track_pieces > 0);
    RunSubmission {
        score: 9_000,
        distance: 1_200,
        duration_seconds: 240,
        coins_collected: 0,
        obstacles_hit: 0,
        powerups_used: 1,
        track_pieces_spawned: 1,
        selected_track_indices: Some(vec![0, 2]),
        is_endless: false,
        is_complete: false,
        player_class: Some("Vanilla".into()),
        started_at: Some("2025-06-01T08:00:05Z".into()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn missing_seed_is_invalid_not_suspicious() {
    let fx = Fixture::new();
    let service = fx.service();
    let report = RunValidator::new(&service)
        .validate(&RunSubmission::default(), "never-issued")
        .unwrap();

    assert!(!report.valid);
    assert!(!report.suspicious);
    assert_eq!(report.errors, vec![SEED_INVALID.to_string()]);
    assert_eq!(report.run_hash.len(), 64);
}

#[test]
fn expired_seed_is_invalid() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);
    fx.clock.advance(Duration::hours(25));

    let report = RunValidator::new(&service).validate(&honest_run(&entry), &entry.seed_id).unwrap();
    assert!(!report.valid);
    assert_eq!(report.errors, vec!["Seed expired or invalid".to_string()]);
}

#[test]
fn plausible_run_passes_all_bound_checks() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);

    let mut run = honest_run(&entry);
    // Exact bounds for the chosen tracks are tighter than the seed bounds.
    let selected = service.bounds_for_selection(&entry, &[0, 2]).unwrap();
    run.coins_collected = i64::from(selected.max_coins);
    run.track_pieces_spawned = i64::from(selected.max_track_pieces);
    run.obstacles_hit = i64::from(selected.max_obstacles);

    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.valid);
    assert!(!report.suspicious, "unexpected errors: {:?}", report.errors);
    assert!(report.errors.is_empty());
}

/// Buys every item of each shop on tier 1 track 0, rerolls each shop once
/// and buys the rerolled items too.
#[test]
fn buying_rerolled_shop_items_stays_within_bounds() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);

    let track = service.select_track(&entry.seed_id, 1, 0).unwrap();
    assert!(!track.shop_positions.is_empty());
    let mut bought = 0usize;
    for shop in 0..track.shop_positions.len() as u32 {
        bought += service.get_shop_items(&entry.seed_id, 1, 0, shop).unwrap().items.len();
        bought += service.reroll_shop(&entry.seed_id, 1, 0, shop, 0).unwrap().items.len();
    }

    let run = RunSubmission {
        // One boss reward on top of the shop purchases.
        powerups_used: bought as i64 + 1,
        selected_track_indices: Some(vec![0]),
        ..honest_run(&entry)
    };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.valid);
    assert!(!report.suspicious, "unexpected errors: {:?}", report.errors);

    // Without any reroll allowance the rerolled items no longer count.
    let mut config = SeedConfig::default_test();
    config.validation.reroll_allowance_per_shop = 0;
    let strict = Fixture::with_config(config);
    let strict_service = strict.service();
    let strict_entry = start(&strict_service);
    let with_rerolls = service.bounds_for_selection(&entry, &[0]).unwrap();
    let without = strict_service.bounds_for_selection(&strict_entry, &[0]).unwrap();
    assert!(without.max_powerups < with_rerolls.max_powerups);
    assert_eq!(without.max_coins, with_rerolls.max_coins);
}

#[test]
fn identical_inputs_hash_identically() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);
    let validator = RunValidator::new(&service);

    let run = honest_run(&entry);
    let a = validator.validate(&run, &entry.seed_id).unwrap();
    let b = validator.validate(&run.clone(), &entry.seed_id).unwrap();
    assert_eq!(a.run_hash, b.run_hash);
    assert_eq!(a.run_hash, run_hash(&entry.seed_id, &run).unwrap());

    let later = RunSubmission { started_at: Some("2025-06-01T09:00:00Z".into()), ..run };
    assert_ne!(validator.validate(&later, &entry.seed_id).unwrap().run_hash, a.run_hash);
}

#[test]
fn inflated_score_is_suspicious_but_valid() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);

    // 1,200 m * 10 points * 5 = 60,000 ceiling.
    let run = RunSubmission { score: 60_001, ..honest_run(&entry) };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.valid);
    assert!(report.suspicious);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Score 60001"), "{:?}", report.errors);

    let at_ceiling = RunSubmission { score: 60_000, ..honest_run(&entry) };
    let report = RunValidator::new(&service).validate(&at_ceiling, &entry.seed_id).unwrap();
    assert!(!report.errors.iter().any(|e| e.starts_with("Score")));
}

#[test]
fn out_of_bounds_counters_are_each_reported() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);

    let run = RunSubmission {
        distance: 5_001,
        coins_collected: i64::from(entry.bounds.max_coins) + 1,
        obstacles_hit: i64::from(entry.bounds.max_obstacles) + 1,
        powerups_used: i64::from(entry.bounds.max_powerups) + 1,
        track_pieces_spawned: i64::from(entry.bounds.max_track_pieces) + 1,
        selected_track_indices: None,
        ..honest_run(&entry)
    };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.valid && report.suspicious);

    for prefix in ["Distance", "Coins", "Obstacles", "Track pieces", "Powerups"] {
        assert!(
            report.errors.iter().any(|e| e.starts_with(prefix)),
            "missing {prefix} error in {:?}",
            report.errors
        );
    }
}

#[test]
fn bad_track_selections_are_suspicious() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);
    let validator = RunValidator::new(&service);

    let too_many = RunSubmission {
        selected_track_indices: Some(vec![0, 1, 2, 0]),
        ..honest_run(&entry)
    };
    let report = validator.validate(&too_many, &entry.seed_id).unwrap();
    assert!(report.suspicious);
    assert!(report.errors.iter().any(|e| e.contains("track selections")));

    let out_of_range = RunSubmission {
        selected_track_indices: Some(vec![0, 3]),
        ..honest_run(&entry)
    };
    let report = validator.validate(&out_of_range, &entry.seed_id).unwrap();
    assert!(report.errors.iter().any(|e| e == "Track index 3 in tier 2 is out of range"));
}

#[test]
fn wrong_player_class_is_suspicious() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);

    let run = RunSubmission { player_class: Some("Tank".into()), ..honest_run(&entry) };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.suspicious);
    assert!(report.errors[0].contains("Tank"));

    // Class comparison ignores case; an absent class is not checked.
    for class in [Some("vanilla".to_string()), None] {
        let run = RunSubmission { player_class: class, ..honest_run(&entry) };
        let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
        assert!(!report.errors.iter().any(|e| e.starts_with("Player class")));
    }
}

#[test]
fn endless_runs_skip_content_bounds() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = start(&service);

    let run = RunSubmission {
        distance: 50_000,
        score: 100_000,
        coins_collected: 10_000,
        obstacles_hit: 10_000,
        powerups_used: 500,
        track_pieces_spawned: 10_000,
        selected_track_indices: Some(vec![0, 1, 2, 0, 1, 2]),
        is_endless: true,
        ..honest_run(&entry)
    };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.valid);
    assert!(!report.suspicious, "unexpected errors: {:?}", report.errors);

    // Score plausibility still applies.
    let run = RunSubmission { distance: 10, ..run };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(report.suspicious);
    assert_eq!(report.errors.len(), 1);
}

#[test]
fn disabled_checks_are_skipped() {
    let mut config = SeedConfig::default_test();
    config.validation.check_score = false;
    config.validation.check_coins = false;
    config.validation.check_player_class = false;
    let fx = Fixture::with_config(config);
    let service = fx.service();
    let entry = start(&service);

    let run = RunSubmission {
        score: 1_000_000_000,
        coins_collected: i64::from(entry.bounds.max_coins) + 500,
        player_class: Some("Tank".into()),
        selected_track_indices: None,
        ..honest_run(&entry)
    };
    let report = RunValidator::new(&service).validate(&run, &entry.seed_id).unwrap();
    assert!(!report.suspicious, "unexpected errors: {:?}", report.errors);
}
