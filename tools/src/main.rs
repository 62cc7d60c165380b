//! seed-runner: headless run-seed generator and validator.
//!
//! Usage:
//!   seed-runner --seed 42 --class Vanilla --db seeds.db
//!   seed-runner --import data/content/sample_content.json --db seeds.db
//!   seed-runner --db seeds.db --ipc-mode

use anyhow::Result;
use chrono::Utc;
use runseed_core::{
    catalog::ContentLibrary,
    clock::SystemClock,
    config::SeedConfig,
    error::{ErrorClass, SeedResult},
    import::ContentExport,
    run_seed::{NewRun, RunSeedService},
    store::SeedStore,
    types::{self, Seed, Tier},
    validation::{RunSubmission, RunValidator},
};
use serde::Serialize;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Start {
        seed: Option<Seed>,
        player_id: Option<i64>,
        device_id: Option<String>,
        max_distance: Option<u32>,
        player_class: Option<String>,
    },
    TierTracks {
        seed_id: String,
        tier: Tier,
    },
    SelectTrack {
        seed_id: String,
        tier: Tier,
        track_index: u8,
    },
    ShopItems {
        seed_id: String,
        tier: Tier,
        track_index: u8,
        shop_index: u32,
    },
    Reroll {
        seed_id: String,
        tier: Tier,
        track_index: u8,
        shop_index: u32,
        reroll_index: u32,
    },
    BossRewards {
        seed_id: String,
        tier: Tier,
    },
    Validate {
        seed_id: String,
        submission: RunSubmission,
    },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 0u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let import = flag_value(&args, "--import");
    let player_class = flag_value(&args, "--class").map(str::to_string);

    if !ipc_mode {
        println!("seed-runner");
        println!("  seed:      {}", if seed == 0 { "random".to_string() } else { seed.to_string() });
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let config = SeedConfig::load(data_dir)?;
    let store = SeedStore::open(db)?;
    store.migrate()?;

    let import_path = match import {
        Some(path) => Some(path.to_string()),
        None if store.content_versions()?.is_empty() => {
            Some(format!("{data_dir}/content/sample_content.json"))
        }
        None => None,
    };
    if let Some(path) = import_path {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let export = ContentExport::from_json(&raw)?;
        let outcome = store.import_content(&export, Utc::now())?;
        if !ipc_mode {
            println!("  imported:  {} ({outcome:?})", export.version);
        }
    }

    let library = store.load_library()?;
    let clock = SystemClock;
    let service = RunSeedService::new(&config, &library, &store, &clock);
    service.cache().purge_expired()?;

    if ipc_mode {
        run_ipc_loop(&service)?;
    } else {
        let run = NewRun {
            player_class,
            ..NewRun::default()
        };
        let entry = if seed == 0 {
            service.generate(&run)?
        } else {
            service.generate_with_seed(seed, &run)?
        };
        print_summary(&service, &library, &entry.seed_id)?;
    }

    Ok(())
}

fn run_ipc_loop(service: &RunSeedService<'_>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let validator = RunValidator::new(service);

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Start {
                seed,
                player_id,
                device_id,
                max_distance,
                player_class,
            } => {
                let run = NewRun {
                    player_id,
                    device_id,
                    max_distance,
                    player_class,
                };
                let entry = match seed {
                    Some(seed) => service.generate_with_seed(seed, &run),
                    None => service.generate(&run),
                };
                respond(entry.and_then(|e| e.start_response()))?
            }
            IpcCommand::TierTracks { seed_id, tier } => {
                respond(service.get_tier_tracks(&seed_id, tier))?
            }
            IpcCommand::SelectTrack {
                seed_id,
                tier,
                track_index,
            } => respond(service.select_track(&seed_id, tier, track_index))?,
            IpcCommand::ShopItems {
                seed_id,
                tier,
                track_index,
                shop_index,
            } => respond(service.get_shop_items(&seed_id, tier, track_index, shop_index))?,
            IpcCommand::Reroll {
                seed_id,
                tier,
                track_index,
                shop_index,
                reroll_index,
            } => respond(service.reroll_shop(&seed_id, tier, track_index, shop_index, reroll_index))?,
            IpcCommand::BossRewards { seed_id, tier } => {
                respond(service.get_boss_rewards(&seed_id, tier))?
            }
            IpcCommand::Validate {
                seed_id,
                submission,
            } => respond(validator.validate(&submission, &seed_id))?,
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

/// One reply line: the payload, or `{error, class}`.
fn respond<T: Serialize>(result: SeedResult<T>) -> Result<String> {
    let line = match result {
        Ok(payload) => serde_json::to_string(&payload)?,
        Err(e) => {
            let class = match e.class() {
                ErrorClass::Client => "client",
                ErrorClass::Server => "server",
            };
            log::warn!("ipc: {e}");
            serde_json::json!({ "error": e.to_string(), "class": class }).to_string()
        }
    };
    Ok(line)
}

fn print_summary(service: &RunSeedService<'_>, library: &ContentLibrary, seed_id: &str) -> Result<()> {
    let entry = service.get_seed_data(seed_id)?;

    println!("=== RUN SEED ===");
    println!("  seed_id:        {}", entry.seed_id);
    println!("  seed:           {}", entry.seed);
    println!("  player class:   {}", entry.player_class);
    println!("  content:        {}", entry.content_version);
    println!("  definitions:    {}", library.definition_count(&entry.content_version));
    println!("  expires at:     {}", entry.expires_at.to_rfc3339());
    println!("  max distance:   {}", entry.max_distance);
    println!();

    println!("=== TIERS ===");
    for tier in types::tiers() {
        for (track_index, track) in (0u8..).zip(entry.tier(tier)?) {
            let sequence = service.track_for_entry(&entry, tier, track_index)?;
            println!(
                "  tier {tier} track {track_index}: length {:>5}  shops {}  pieces {:>4}  boss {}",
                track.length,
                track.shop_count,
                sequence.pieces.len(),
                track.boss_id.as_deref().unwrap_or("-"),
            );
        }
        let rewards: Vec<&str> = entry
            .boss_rewards
            .get(&tier)
            .map(|r| r.iter().map(|b| b.id.as_str()).collect())
            .unwrap_or_default();
        println!("  tier {tier} boss rewards: {}", rewards.join(", "));
    }
    println!();

    println!("=== BOUNDS ===");
    println!("  track pieces:   {}", entry.bounds.max_track_pieces);
    println!("  coins:          {}", entry.bounds.max_coins);
    println!("  obstacles:      {}", entry.bounds.max_obstacles);
    println!("  powerups:       {}", entry.bounds.max_powerups);
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
