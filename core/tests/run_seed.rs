use chrono::{Duration, TimeZone, Utc};
use runseed_core::{
    catalog::ContentLibrary,
    clock::ManualClock,
    config::SeedConfig,
    error::{ErrorClass, SeedError},
    import::ContentExport,
    run_seed::{NewRun, RunSeedService, MAX_SEED},
    seed_cache::{shop_key, MemoryCache},
    types,
};
use serde_json::json;

// ── Test helpers ────────────────────────────────────────────────────────────

struct Fixture {
    config: SeedConfig,
    library: ContentLibrary,
    cache: MemoryCache,
    clock: ManualClock,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            config: SeedConfig::default_test(),
            library: ContentLibrary::default_test(),
            cache: MemoryCache::new(),
            clock: ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()),
        }
    }

    fn service(&self) -> RunSeedService<'_> {
        RunSeedService::new(&self.config, &self.library, &self.cache, &self.clock)
    }
}

fn scavenger() -> NewRun {
    NewRun {
        player_id: Some(17),
        device_id: Some("device-abc".into()),
        max_distance: Some(4_000),
        player_class: Some("Scavenger".into()),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn generated_entry_has_full_tree() {
    let fx = Fixture::new();
    let entry = fx.service().generate_with_seed(42, &scavenger()).unwrap();

    assert_eq!(entry.seed, 42);
    assert_eq!(entry.player_id, Some(17));
    assert_eq!(entry.device_id.as_deref(), Some("device-abc"));
    assert_eq!(entry.player_class, "Scavenger");
    assert_eq!(entry.content_version, "test-1.0.0");
    assert_eq!(entry.max_distance, 4_000);
    assert_eq!(entry.expires_at - entry.created_at, Duration::hours(24));
    assert!(uuid_like(&entry.seed_id), "seed id {}", entry.seed_id);

    assert_eq!(entry.tiers.len(), 3);
    for tier in types::tiers() {
        let range = fx.config.tracks.tier_length(tier).unwrap();
        let tracks = entry.tier(tier).unwrap();
        assert_eq!(tracks.len(), 3);
        for track in tracks {
            assert!((range.min..=range.max).contains(&track.length));
            assert!((1..=2).contains(&track.shop_count));
        }
        // One boss shared by every track of a tier.
        assert!(tracks.iter().all(|t| t.boss_id == tracks[0].boss_id));
    }
    assert_eq!(entry.tier(3).unwrap()[0].boss_id.as_deref(), Some("boss_king_rat"));
    assert_eq!(entry.tier(1).unwrap()[0].boss_id.as_deref(), Some("boss_gator"));
}

fn uuid_like(id: &str) -> bool {
    id.len() == 36 && id.chars().filter(|c| *c == '-').count() == 4
}

#[test]
fn random_seeds_stay_in_range() {
    let fx = Fixture::new();
    let service = fx.service();
    for _ in 0..5 {
        let entry = service.generate(&NewRun::default()).unwrap();
        assert!((1..=MAX_SEED).contains(&entry.seed));
        assert_eq!(entry.player_class, "Vanilla");
        assert_eq!(entry.max_distance, fx.config.runs.max_distance);
    }
}

#[test]
fn shop_inventories_exist_for_every_shop() {
    let fx = Fixture::new();
    let entry = fx.service().generate_with_seed(1_000, &scavenger()).unwrap();

    let mut expected = 0;
    for tier in types::tiers() {
        for (track_index, track) in (0u8..).zip(entry.tier(tier).unwrap()) {
            for shop in 0..track.shop_count {
                expected += 1;
                let items = &entry.shop_items[&shop_key(tier, track_index, shop)];
                assert!((2..=3).contains(&items.len()), "{} items", items.len());

                let mut ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), items.len(), "duplicate item in one shop");
                if tier == 1 {
                    assert!(!ids.contains(&"powerup_extra_life"), "tier 2+ powerup in tier 1");
                }
            }
        }
    }
    assert_eq!(entry.shop_items.len(), expected);
}

#[test]
fn shop_costs_scale_with_tier() {
    let fx = Fixture::new();
    let entry = fx.service().generate_with_seed(31, &scavenger()).unwrap();

    for (key, items) in &entry.shop_items {
        let tier: u8 = key.split('_').next().unwrap().parse().unwrap();
        for item in items {
            let expected = match (item.id.as_str(), tier) {
                ("powerup_magnet", t) => [100, 150, 200][usize::from(t - 1)],
                ("powerup_shield", t) => [150, 225, 300][usize::from(t - 1)],
                ("powerup_speed", t) => [80, 100, 120][usize::from(t - 1)],
                ("powerup_extra_life", t) => [300, 600, 900][usize::from(t - 1)],
                ("powerup_coin_doubler", t) => [120, 180, 240][usize::from(t - 1)],
                (other, _) => panic!("unexpected shop item {other}"),
            };
            assert_eq!(item.cost, expected, "{} in tier {tier}", item.id);
            assert!(!item.name.is_empty());
            assert!(item.properties.is_object());
        }
    }
}

#[test]
fn class_restricted_powerups_only_reach_their_class() {
    let fx = Fixture::new();
    let service = fx.service();

    for seed in 1..20 {
        let vanilla = service.generate_with_seed(seed, &NewRun::default()).unwrap();
        let offered = vanilla
            .shop_items
            .values()
            .flatten()
            .map(|i| i.id.as_str())
            .chain(vanilla.boss_rewards.values().flatten().map(|r| r.id.as_str()))
            .collect::<Vec<_>>();
        assert!(!offered.contains(&"powerup_coin_doubler"));
    }
}

#[test]
fn boss_rewards_exclude_non_reward_powerups() {
    let fx = Fixture::new();
    let service = fx.service();

    for seed in 1..20 {
        let entry = service.generate_with_seed(seed, &scavenger()).unwrap();
        for tier in types::tiers() {
            let rewards = service.get_boss_rewards(&entry.seed_id, tier).unwrap().rewards;
            assert_eq!(rewards.len(), 2);
            assert!(rewards.iter().all(|r| r.id != "powerup_speed"));
            assert_ne!(rewards[0].id, rewards[1].id);
        }
    }
}

#[test]
fn sibling_reads_come_from_the_cached_entry() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = service.generate_with_seed(8, &scavenger()).unwrap();

    let start = entry.start_response().unwrap();
    assert_eq!(start.tier, 1);
    assert_eq!(start.seed, 8);
    assert_eq!(start.tracks, entry.tiers[&1]);

    let tier2 = service.get_tier_tracks(&entry.seed_id, 2).unwrap();
    assert_eq!(tier2.tracks, entry.tiers[&2]);
    assert_eq!(tier2.content_version, "test-1.0.0");

    let shop = service.get_shop_items(&entry.seed_id, 1, 0, 0).unwrap();
    assert_eq!(shop.items, entry.shop_items[&shop_key(1, 0, 0)]);

    let track = service.select_track(&entry.seed_id, 2, 1).unwrap();
    let descriptor = &entry.tiers[&2][1];
    assert_eq!(track.length, descriptor.length);
    assert_eq!(track.shop_count, descriptor.shop_count);
    assert_eq!(track.boss_id, descriptor.boss_id);
}

#[test]
fn sibling_reads_reject_bad_coordinates() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = service.generate_with_seed(8, &scavenger()).unwrap();

    let err = service.get_tier_tracks(&entry.seed_id, 4).unwrap_err();
    assert!(matches!(err, SeedError::InvalidTier { tier: 4 }));
    assert_eq!(err.class(), ErrorClass::Client);

    let err = service.select_track(&entry.seed_id, 1, 3).unwrap_err();
    assert!(matches!(err, SeedError::InvalidTrackIndex { tier: 1, track_index: 3 }));

    let err = service.get_shop_items(&entry.seed_id, 1, 0, 9).unwrap_err();
    assert!(matches!(err, SeedError::UnknownShop { ref key } if key == "1_0_9"));

    let err = service.get_tier_tracks("no-such-seed", 1).unwrap_err();
    assert!(matches!(err, SeedError::SeedNotFound { .. }));
}

#[test]
fn rerolls_are_deterministic_and_priced_by_ladder() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = service.generate_with_seed(64, &scavenger()).unwrap();

    let first = service.reroll_shop(&entry.seed_id, 2, 0, 0, 0).unwrap();
    let again = service.reroll_shop(&entry.seed_id, 2, 0, 0, 0).unwrap();
    assert_eq!(first, again);
    assert_eq!(first.reroll_cost, 50);
    assert!((2..=3).contains(&first.items.len()));

    let costs: Vec<u32> = (0..6)
        .map(|n| service.reroll_shop(&entry.seed_id, 2, 0, 0, n).unwrap().reroll_cost)
        .collect();
    assert_eq!(costs, vec![50, 100, 150, 200, 200, 200]);

    // Rerolls never overwrite the cached inventory.
    let cached = service.get_shop_items(&entry.seed_id, 2, 0, 0).unwrap();
    assert_eq!(cached.items, entry.shop_items[&shop_key(2, 0, 0)]);

    assert!(matches!(
        service.reroll_shop(&entry.seed_id, 2, 0, 7, 0),
        Err(SeedError::UnknownShop { .. })
    ));
}

#[test]
fn bounds_cover_every_track() {
    let fx = Fixture::new();
    let service = fx.service();
    let entry = service.generate_with_seed(2_024, &scavenger()).unwrap();

    let mut pieces = 0;
    for tier in types::tiers() {
        let tier_max = (0..3u8)
            .map(|t| service.select_track(&entry.seed_id, tier, t).unwrap().pieces.len() as u32)
            .max()
            .unwrap();
        pieces += tier_max;
    }
    assert_eq!(entry.bounds.max_track_pieces, pieces);
    // At least one boss reward per tier.
    assert!(entry.bounds.max_powerups >= 3);

    for first in 0..3u8 {
        let selected = service.bounds_for_selection(&entry, &[first, 0, 0]).unwrap();
        assert!(selected.max_track_pieces <= entry.bounds.max_track_pieces);
        assert!(selected.max_coins <= entry.bounds.max_coins);
        assert!(selected.max_obstacles <= entry.bounds.max_obstacles);
        assert!(selected.max_powerups <= entry.bounds.max_powerups);
    }
}

/// A collectible worth close to u32::MAX on every normal piece.
#[test]
fn huge_collectible_values_saturate_run_bounds() {
    let fx = Fixture::new();
    let export: ContentExport = serde_json::from_value(json!({
        "version": "jackpot-1",
        "definitions": [
            { "type": "track_piece", "id": "start", "name": "Start",
              "properties": { "piece_type": "Start", "length": 800 } },
            { "type": "track_piece", "id": "vault", "name": "Vault",
              "properties": { "piece_type": "Normal", "length": 800,
                  "spawn_configs": [
                      { "component_name": "CoinLane", "probability": 1.0,
                        "weighted_definitions": [ { "id": "jackpot", "weight": 1 } ] } ] } },
            { "type": "track_piece", "id": "kiosk", "name": "Kiosk",
              "properties": { "piece_type": "Shop", "length": 800 } },
            { "type": "collectible", "id": "jackpot", "name": "Jackpot",
              "properties": { "value": 4_000_000_000u64 } },
        ],
    }))
    .unwrap();
    let library = ContentLibrary::from_export(&export).unwrap();
    let service = RunSeedService::new(&fx.config, &library, &fx.cache, &fx.clock);

    let entry = service.generate_with_seed(5, &NewRun::default()).unwrap();
    assert_eq!(entry.bounds.max_coins, u32::MAX);
    let selected = service.bounds_for_selection(&entry, &[0, 1, 2]).unwrap();
    assert_eq!(selected.max_coins, u32::MAX);
    assert!(selected.max_track_pieces > 0);
}

#[test]
fn missing_active_version_fails_generation() {
    let fx = Fixture::new();
    let empty = ContentLibrary::new();
    let service = RunSeedService::new(&fx.config, &empty, &fx.cache, &fx.clock);

    let err = service.generate_with_seed(1, &NewRun::default()).unwrap_err();
    assert!(matches!(err, SeedError::NoActiveContentVersion));
    assert_eq!(err.class(), ErrorClass::Server);
    assert!(fx.cache.is_empty());
}
