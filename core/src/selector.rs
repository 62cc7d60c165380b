//! Seeded selection over an ordered candidate slice.
//!
//! RULE: selectors consume randomness ONLY from the SeedRng they are
//! handed. Given the same rng state and the same slice they always
//! return the same candidate.
//!
//! Weighted roll: roll = next_f64() * total. Walk the candidates in order,
//! accumulating weight; the first positively weighted candidate whose
//! cumulative weight is >= roll wins. If rounding leaves nothing
//! selected, the last candidate wins. A zero total weight selects
//! uniformly. Negative and NaN weights count as zero.

use crate::{
    error::{SeedError, SeedResult},
    rng::SeedRng,
};

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

fn empty(pool: &str) -> SeedError {
    SeedError::EmptyCandidateSet { pool: pool.to_string() }
}

/// Pick one candidate uniformly.
pub fn select_uniform<'a, T>(
    rng: &mut SeedRng,
    candidates: &'a [T],
    pool: &str,
) -> SeedResult<&'a T> {
    if candidates.is_empty() {
        return Err(empty(pool));
    }
    let idx = rng.next_u64_below(candidates.len() as u64) as usize;
    Ok(&candidates[idx])
}

/// Index of the weighted pick. `candidates` must be non-empty.
fn weighted_index<T>(rng: &mut SeedRng, candidates: &[T], weight: &impl Fn(&T) -> f64) -> usize {
    let total: f64 = candidates.iter().map(|c| sanitize(weight(c))).sum();
    if total <= 0.0 {
        return rng.next_u64_below(candidates.len() as u64) as usize;
    }

    let roll = rng.next_f64() * total;
    let mut cumulative = 0.0;
    for (i, candidate) in candidates.iter().enumerate() {
        let w = sanitize(weight(candidate));
        cumulative += w;
        if w > 0.0 && cumulative >= roll {
            return i;
        }
    }
    candidates.len() - 1
}

/// Pick one candidate with probability proportional to `weight`.
pub fn select_weighted<'a, T>(
    rng: &mut SeedRng,
    candidates: &'a [T],
    pool: &str,
    weight: impl Fn(&T) -> f64,
) -> SeedResult<&'a T> {
    if candidates.is_empty() {
        return Err(empty(pool));
    }
    Ok(&candidates[weighted_index(rng, candidates, &weight)])
}

/// Up to `count` distinct candidates, drawn one at a time by weight
/// without replacement. Returned in draw order.
pub fn select_distinct_weighted<'a, T>(
    rng: &mut SeedRng,
    candidates: &'a [T],
    count: usize,
    pool: &str,
    weight: impl Fn(&T) -> f64,
) -> SeedResult<Vec<&'a T>> {
    if candidates.is_empty() {
        return Err(empty(pool));
    }
    let mut remaining: Vec<&'a T> = candidates.iter().collect();
    let mut picked = Vec::with_capacity(count.min(candidates.len()));
    while picked.len() < count && !remaining.is_empty() {
        let idx = weighted_index(rng, &remaining, &|c: &&T| weight(*c));
        picked.push(remaining.remove(idx));
    }
    Ok(picked)
}
