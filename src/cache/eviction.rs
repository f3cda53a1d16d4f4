//! Eviction Policy Module
//!
//! Frequency-weighted-by-recency scoring used to pick entries to drop once the
//! memory budget is exceeded. Eviction runs in batches from the memory check,
//! never per insert.

use std::cmp::Ordering;

use crate::cache::CacheEntry;

/// Percentage of pre-eviction usage a single eviction pass frees at minimum.
pub const EVICTION_PERCENT: usize = 30;

/// Lower bound for the idle time divisor, in milliseconds.
const MIN_IDLE_MS: u64 = 1;

// == Eviction Policy Trait ==
/// Scores entries; lower scores are evicted first.
pub trait EvictionPolicy: Send + Sync + std::fmt::Debug {
    /// Returns the keep-score of `entry` at time `now`.
    fn score(&self, entry: &CacheEntry, now: u64) -> f64;
}

// == Frequency/Recency Policy ==
/// `access_count / max(1ms, now - last_accessed)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyRecencyPolicy;

impl EvictionPolicy for FrequencyRecencyPolicy {
    fn score(&self, entry: &CacheEntry, now: u64) -> f64 {
        let idle = now.saturating_sub(entry.last_accessed).max(MIN_IDLE_MS);
        entry.access_count as f64 / idle as f64
    }
}

// == Eviction Target ==
/// Bytes a pass must free: 30% of current usage, or the whole overshoot if
/// that is larger, so one pass always lands back under budget.
pub fn eviction_target(memory_usage: usize, max_memory_usage: usize) -> usize {
    let fraction = memory_usage.saturating_mul(EVICTION_PERCENT).div_ceil(100);
    fraction.max(memory_usage.saturating_sub(max_memory_usage))
}

// == Select Victims ==
/// Orders entries by ascending score and returns the shortest prefix whose
/// sizes add up to `target` bytes (or every key if that is not reachable).
///
/// Ties are broken by key so a pass is deterministic.
pub fn select_victims<'a, P, I>(policy: &P, entries: I, now: u64, target: usize) -> Vec<String>
where
    P: EvictionPolicy + ?Sized,
    I: IntoIterator<Item = (&'a String, &'a CacheEntry)>,
{
    let mut scored: Vec<(f64, &String, usize)> = entries
        .into_iter()
        .map(|(key, entry)| (policy.score(entry, now), key, entry.size))
        .collect();

    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });

    let mut freed = 0usize;
    let mut victims = Vec::new();
    for (_, key, size) in scored {
        if freed >= target {
            break;
        }
        freed += size;
        victims.push(key.clone());
    }
    victims
}
