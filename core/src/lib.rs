//! Deterministic run-seed engine: derives a run's content tree from one
//! integer seed, caches it, and validates submitted runs against it.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod import;
pub mod rng;
pub mod run_seed;
pub mod seed_cache;
pub mod selector;
pub mod store;
pub mod track_generator;
pub mod types;
pub mod validation;
