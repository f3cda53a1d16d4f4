//! Navigation Tracker
//!
//! Records per-route visit statistics and derives a prefetch priority from
//! how often and how recently each route was visited.

use std::collections::HashMap;

use serde::Serialize;

/// Window over which recency decays to zero (24 hours)
pub const RECENCY_WINDOW_MS: u64 = 86_400_000;

/// Visit count at which the frequency score saturates
pub const FREQUENCY_SATURATION: u64 = 10;

/// Routes at or below this priority are never prefetched
pub const PRIORITY_THRESHOLD: f64 = 0.5;

/// Maximum number of candidates returned per query
pub const MAX_PREFETCH_CANDIDATES: usize = 5;

const RECENCY_WEIGHT: f64 = 0.6;
const FREQUENCY_WEIGHT: f64 = 0.4;

// == Navigation Pattern ==
/// Visit statistics for one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationPattern {
    pub route: String,
    pub frequency: u64,
    /// Unix milliseconds of the latest visit
    pub last_visited: u64,
    /// Priority in `[0, 1]` as of the latest visit
    pub prefetch_priority: f64,
}

// == Priority ==
/// `0.6 * recency + 0.4 * frequency`, each component clamped to `[0, 1]`.
pub fn prefetch_priority(frequency: u64, age_ms: u64) -> f64 {
    let recency = (1.0 - age_ms as f64 / RECENCY_WINDOW_MS as f64).max(0.0);
    let frequency = (frequency as f64 / FREQUENCY_SATURATION as f64).min(1.0);
    RECENCY_WEIGHT * recency + FREQUENCY_WEIGHT * frequency
}

// == Navigation Tracker ==
/// Owns every [`NavigationPattern`]. Patterns are created on first visit and
/// never removed.
#[derive(Debug, Default)]
pub struct NavigationTracker {
    patterns: HashMap<String, NavigationPattern>,
}

impl NavigationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Track ==
    /// Records a visit to `route` at `now` and returns its updated pattern.
    pub fn track(&mut self, route: &str, now: u64) -> &NavigationPattern {
        let pattern = self
            .patterns
            .entry(route.to_string())
            .or_insert_with(|| NavigationPattern {
                route: route.to_string(),
                frequency: 0,
                last_visited: now,
                prefetch_priority: 0.0,
            });

        pattern.frequency += 1;
        pattern.last_visited = now;
        pattern.prefetch_priority = prefetch_priority(pattern.frequency, 0);
        pattern
    }

    // == Prefetch Candidates ==
    /// Up to five routes with priority above 0.5, highest first.
    pub fn prefetch_candidates(&self) -> Vec<String> {
        let mut candidates: Vec<&NavigationPattern> = self
            .patterns
            .values()
            .filter(|p| p.prefetch_priority > PRIORITY_THRESHOLD)
            .collect();

        candidates.sort_by(|a, b| {
            b.prefetch_priority
                .total_cmp(&a.prefetch_priority)
                .then_with(|| b.last_visited.cmp(&a.last_visited))
                .then_with(|| a.route.cmp(&b.route))
        });

        candidates
            .into_iter()
            .take(MAX_PREFETCH_CANDIDATES)
            .map(|p| p.route.clone())
            .collect()
    }

    /// Returns the pattern recorded for `route`.
    pub fn pattern(&self, route: &str) -> Option<&NavigationPattern> {
        self.patterns.get(route)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
