//! Termination signals for the scroll driver.
//!
//! No single signal is trustworthy in a virtualized view: item count and
//! content height alias when content swaps in place, the oldest visible
//! identity can repeat, and the top sentinel can flash into view before older
//! pages finish loading. Each signal is computed independently and the
//! decision combines them with fixed precedence:
//!
//! 1. empty window
//! 2. start boundary reached
//! 3. aggregate growth vetoes every stagnation-based stop
//! 4. sentinel seen and stagnant for `sentinel_passes`
//! 5. stagnant for `hard_passes` regardless of the sentinel

use serde::{Deserialize, Serialize};

/// Metrics observed after one scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassMetrics {
    pub window_len: usize,
    pub content_height: u64,
    pub oldest_identity: Option<String>,
    pub aggregate_grew: bool,
}

/// Counts consecutive passes without structural progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagnationTracker {
    stagnant_passes: u32,
    last_height: Option<u64>,
    last_window_len: Option<usize>,
    last_oldest: Option<String>,
}

impl StagnationTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn stagnant_passes(&self) -> u32 {
        self.stagnant_passes
    }

    /// Forget everything; used after the view jumps (history expansion).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold one pass into the tracker and return the updated stagnant count.
    pub fn observe(&mut self, metrics: &PassMetrics) -> u32 {
        let height_unchanged = self.last_height == Some(metrics.content_height);
        let count_unchanged = self.last_window_len == Some(metrics.window_len);
        let oldest_unchanged = metrics.oldest_identity.is_some()
            && self.last_oldest.as_ref() == metrics.oldest_identity.as_ref();

        if metrics.aggregate_grew {
            self.stagnant_passes = 0;
        } else if (height_unchanged && count_unchanged) || oldest_unchanged {
            self.stagnant_passes = self.stagnant_passes.saturating_add(1);
        } else {
            self.stagnant_passes = 0;
        }

        if metrics.oldest_identity.is_some() {
            self.last_oldest.clone_from(&metrics.oldest_identity);
        }
        self.last_height = Some(metrics.content_height);
        self.last_window_len = Some(metrics.window_len);
        self.stagnant_passes
    }
}

/// Why the driver stopped scrolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Oldest visible item is at or before the caller's start boundary.
    BoundaryReached,
    /// Top sentinel seen and the view stopped changing.
    SentinelConfirmed,
    /// The view stopped changing for long enough without a sentinel.
    StagnationLimit,
    /// Nothing is materialized at all.
    EmptyWindow,
}

impl StopReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BoundaryReached => "boundary_reached",
            Self::SentinelConfirmed => "sentinel_confirmed",
            Self::StagnationLimit => "stagnation_limit",
            Self::EmptyWindow => "empty_window",
        }
    }
}

/// Everything the stop decision looks at for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationSignals {
    pub window_len: usize,
    pub oldest_visible_ts: Option<i64>,
    pub start_boundary: Option<i64>,
    pub sentinel_seen: bool,
    pub aggregate_grew: bool,
    pub stagnant_passes: u32,
}

#[must_use]
pub const fn window_empty(signals: &IterationSignals) -> bool {
    signals.window_len == 0
}

#[must_use]
pub fn boundary_reached(signals: &IterationSignals) -> bool {
    matches!(
        (signals.oldest_visible_ts, signals.start_boundary),
        (Some(oldest), Some(start)) if oldest <= start
    )
}

#[must_use]
pub const fn sentinel_confirmed(signals: &IterationSignals, threshold: u32) -> bool {
    signals.sentinel_seen && signals.stagnant_passes >= threshold
}

#[must_use]
pub const fn stagnation_exhausted(signals: &IterationSignals, threshold: u32) -> bool {
    signals.stagnant_passes >= threshold
}

/// Thresholds for the stagnation-based predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub sentinel_passes: u32,
    pub hard_passes: u32,
}

impl StopPolicy {
    /// Combine the predicates in precedence order.
    #[must_use]
    pub fn decide(&self, signals: &IterationSignals) -> Option<StopReason> {
        if window_empty(signals) {
            return Some(StopReason::EmptyWindow);
        }
        if boundary_reached(signals) {
            return Some(StopReason::BoundaryReached);
        }
        if signals.aggregate_grew {
            return None;
        }
        if sentinel_confirmed(signals, self.sentinel_passes) {
            return Some(StopReason::SentinelConfirmed);
        }
        if stagnation_exhausted(signals, self.hard_passes) {
            return Some(StopReason::StagnationLimit);
        }
        None
    }
}
