//! Per-run cursor state threaded through every scan pass.
//!
//! The extractor reads and advances this to resolve ambiguous evidence: a
//! divider reading "7 September" takes its year from the last seen time, and
//! a message without an author label inherits the previous author.

use crate::time::{Calendar, year_of};

/// Lowest system cursor value; keeps unplaced notices ahead of everything.
pub const SYSTEM_CURSOR_FLOOR: i64 = -9_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderContext {
    pub last_time_ms: Option<i64>,
    pub year_hint: Option<i32>,
    /// Origin for sequence order keys, fixed when the run starts.
    pub sequence_base: f64,
    pub sequence_counter: u64,
    pub last_author: String,
    pub system_cursor: i64,
    calendar: Calendar,
}

impl OrderContext {
    #[must_use]
    pub const fn new(sequence_base: f64, calendar: Calendar) -> Self {
        Self {
            last_time_ms: None,
            year_hint: None,
            sequence_base,
            sequence_counter: 0,
            last_author: String::new(),
            system_cursor: SYSTEM_CURSOR_FLOOR,
            calendar,
        }
    }

    /// Context for re-extracting one already captured message, seeded from
    /// what is known about it.
    #[must_use]
    pub fn seeded(
        sequence_base: f64,
        calendar: Calendar,
        author: &str,
        timestamp_ms: Option<i64>,
    ) -> Self {
        let mut ctx = Self::new(sequence_base, calendar);
        ctx.last_author = author.to_string();
        if let Some(ts) = timestamp_ms {
            ctx.observe_time(ts);
        }
        ctx.system_cursor = 0;
        ctx
    }

    #[must_use]
    pub const fn calendar(&self) -> Calendar {
        self.calendar
    }

    /// Move the time cursor and refresh the year hint.
    pub fn observe_time(&mut self, ts_ms: i64) {
        self.last_time_ms = Some(ts_ms);
        if let Some(year) = year_of(ts_ms, self.calendar) {
            self.year_hint = Some(year);
        }
    }

    pub fn observe_author(&mut self, author: &str) {
        if !author.is_empty() {
            self.last_author = author.to_string();
        }
    }

    /// Next order key for an item without a parseable timestamp.
    ///
    /// Monotonic within a run; not comparable with wall-clock keys.
    #[allow(clippy::cast_precision_loss)]
    pub fn next_sequence_key(&mut self) -> f64 {
        let key = self.sequence_base + self.sequence_counter as f64;
        self.sequence_counter += 1;
        key
    }

    /// Approximate time for a system notice.
    ///
    /// Parsed evidence wins; otherwise just before the last seen time;
    /// otherwise the system cursor. The cursor advances on every call so
    /// consecutive unplaced notices keep their rendering order.
    pub fn approximate_system_time(&mut self, parsed: Option<i64>) -> i64 {
        let cursor = self.system_cursor;
        self.system_cursor = cursor.saturating_add(1);
        if let Some(ts) = parsed {
            self.observe_time(ts);
            return ts;
        }
        self.last_time_ms.map_or(cursor, |last| last - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> Calendar {
        Calendar::utc()
    }

    #[test]
    fn observe_time_sets_year_hint() {
        let mut ctx = OrderContext::new(0.0, utc());
        ctx.observe_time(1_704_456_000_000);
        assert_eq!(ctx.year_hint, Some(2024));
        assert_eq!(ctx.last_time_ms, Some(1_704_456_000_000));
    }

    #[test]
    fn sequence_keys_are_monotonic() {
        let mut ctx = OrderContext::new(1_000.0, utc());
        let a = ctx.next_sequence_key();
        let b = ctx.next_sequence_key();
        assert!((a - 1_000.0).abs() < f64::EPSILON);
        assert!(b > a);
    }

    #[test]
    fn system_time_falls_back_through_cursor() {
        let mut ctx = OrderContext::new(0.0, utc());
        let first = ctx.approximate_system_time(None);
        let second = ctx.approximate_system_time(None);
        assert_eq!(first, SYSTEM_CURSOR_FLOOR);
        assert_eq!(second, SYSTEM_CURSOR_FLOOR + 1);

        ctx.observe_time(5_000);
        assert_eq!(ctx.approximate_system_time(None), 4_999);
        assert_eq!(ctx.approximate_system_time(Some(9_000)), 9_000);
        assert_eq!(ctx.last_time_ms, Some(9_000));
    }

    #[test]
    fn empty_author_does_not_clear_cursor() {
        let mut ctx = OrderContext::new(0.0, utc());
        ctx.observe_author("alice");
        ctx.observe_author("");
        assert_eq!(ctx.last_author, "alice");
    }
}
