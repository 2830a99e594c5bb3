//! Final ordering of the aggregate into a day-bucketed transcript.
//!
//! # Algorithm
//!
//! 1. Sort entries by order key (stable; discovery breaks ties).
//! 2. Walk backwards. A system-evidence entry whose own time is missing, or
//!    not earlier than the next dated message, is anchored immediately before
//!    that message.
//! 3. Drop system evidence unless the caller keeps system notices, then
//!    re-sort by resolved timestamp, order key, discovery.
//! 4. Apply the caller's bounds. Entries without a timestamp always survive.
//! 5. Bucket by calendar day, emit one synthetic divider per day, then the
//!    day's messages. Undated messages follow all buckets in discovery order.
//!
//! The resolver never fails: missing or ambiguous time only affects
//! placement.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::ScrapeOptions;
use crate::model::{AggregateEntry, DayDivider, EntryKind, TranscriptEntry};
use crate::text::is_placeholder_text;
use crate::time::{Calendar, day_label, local_day};

/// How far before its anchor message an anchored entry sorts.
pub const ANCHOR_EPSILON: f64 = 0.5;

fn by_order_key(a: &AggregateEntry, b: &AggregateEntry) -> Ordering {
    a.order_key
        .total_cmp(&b.order_key)
        .then(a.discovery.cmp(&b.discovery))
}

fn by_resolved_time(a: &AggregateEntry, b: &AggregateEntry) -> Ordering {
    a.resolved_ts()
        .cmp(&b.resolved_ts())
        .then(a.order_key.total_cmp(&b.order_key))
        .then(a.discovery.cmp(&b.discovery))
}

/// Anchor system evidence to the message that follows it.
///
/// `entries` must already be sorted by order key.
pub fn anchor_system_evidence(entries: &mut [AggregateEntry]) {
    let mut next_message_ts: Option<i64> = None;
    for entry in entries.iter_mut().rev() {
        match entry.kind {
            EntryKind::Message => {
                if let Some(ts) = entry.ts_ms.or(entry.message.timestamp_ms) {
                    next_message_ts = Some(ts);
                }
            }
            EntryKind::SystemEvidence => {
                let Some(next) = next_message_ts else {
                    continue;
                };
                if entry.ts_ms.is_none_or(|own| own >= next) {
                    entry.anchor_ts = Some(next);
                    #[allow(clippy::cast_precision_loss)]
                    let key = next as f64 - ANCHOR_EPSILON;
                    entry.order_key = key;
                }
            }
        }
    }
}

fn is_generic_notice(entry: &AggregateEntry) -> bool {
    let text = entry.message.text.trim();
    is_placeholder_text(text) || text.eq_ignore_ascii_case("system")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderResolver {
    calendar: Calendar,
    today: NaiveDate,
}

impl OrderResolver {
    /// `calendar` decides days; `today` anchors relative labels.
    #[must_use]
    pub const fn new(calendar: Calendar, today: NaiveDate) -> Self {
        Self { calendar, today }
    }

    #[must_use]
    pub fn resolve(
        &self,
        mut entries: Vec<AggregateEntry>,
        options: &ScrapeOptions,
    ) -> Vec<TranscriptEntry> {
        entries.sort_by(by_order_key);
        anchor_system_evidence(&mut entries);

        let mut kept: Vec<AggregateEntry> = entries
            .into_iter()
            .filter(|entry| match entry.kind {
                EntryKind::Message => true,
                EntryKind::SystemEvidence => {
                    options.include_system_dividers && !is_generic_notice(entry)
                }
            })
            .filter(|entry| options.in_bounds(entry.resolved_ts()))
            .collect();
        kept.sort_by(by_resolved_time);

        let mut buckets: BTreeMap<NaiveDate, Vec<(i64, AggregateEntry)>> = BTreeMap::new();
        let mut undated: Vec<AggregateEntry> = Vec::new();
        for entry in kept {
            let placed = entry
                .resolved_ts()
                .and_then(|ts| local_day(ts, self.calendar).map(|day| (ts, day)));
            match placed {
                Some((ts, day)) => buckets.entry(day).or_default().push((ts, entry)),
                None => undated.push(entry),
            }
        }
        undated.sort_by_key(|entry| entry.discovery);

        let mut out = Vec::new();
        for (day, items) in buckets {
            if options.day_dividers {
                if let Some((first_ts, _)) = items.first() {
                    out.push(TranscriptEntry::DayDivider(DayDivider {
                        day,
                        label: day_label(day, self.today),
                        ts_ms: *first_ts,
                    }));
                }
            }
            out.extend(
                items
                    .into_iter()
                    .map(|(_, entry)| TranscriptEntry::Message(entry.message)),
            );
        }
        out.extend(
            undated
                .into_iter()
                .map(|entry| TranscriptEntry::Message(entry.message)),
        );

        tracing::debug!(entries = out.len(), "transcript resolved");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageRecord;
    use crate::time::parse_timestamp;

    fn utc() -> Calendar {
        Calendar::utc()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    fn resolver() -> OrderResolver {
        OrderResolver::new(utc(), today())
    }

    fn ts(s: &str) -> i64 {
        parse_timestamp(s).expect("timestamp")
    }

    #[allow(clippy::cast_precision_loss)]
    fn dated(id: &str, at: &str, discovery: u64) -> AggregateEntry {
        let t = ts(at);
        let mut entry = AggregateEntry::message(MessageRecord::new(id, "alice", Some(t), id), t as f64, Some(t));
        entry.discovery = discovery;
        entry
    }

    fn undated(id: &str, key: f64, discovery: u64) -> AggregateEntry {
        let mut entry = AggregateEntry::message(MessageRecord::new(id, "alice", None, id), key, None);
        entry.discovery = discovery;
        entry
    }

    fn notice(id: &str, own_ts: Option<i64>, key: f64, discovery: u64) -> AggregateEntry {
        let mut message = MessageRecord::new(id, crate::model::SYSTEM_AUTHOR, None, format!("{id} joined"));
        message.is_system = true;
        let mut entry = AggregateEntry::system_evidence(message, key, own_ts);
        entry.discovery = discovery;
        entry
    }

    fn ids(out: &[TranscriptEntry]) -> Vec<String> {
        out.iter()
            .map(|e| match e {
                TranscriptEntry::DayDivider(d) => format!("#{}", d.day),
                TranscriptEntry::Message(m) => m.id.clone(),
            })
            .collect()
    }

    #[test]
    fn two_days_two_dividers() {
        let entries = vec![
            dated("c", "2024-01-06T09:00:00Z", 0),
            dated("b", "2024-01-05T15:00:00Z", 1),
            dated("a", "2024-01-05T08:00:00Z", 2),
        ];
        let out = resolver().resolve(entries, &ScrapeOptions::default());
        assert_eq!(ids(&out), ["#2024-01-05", "a", "b", "#2024-01-06", "c"]);
        let TranscriptEntry::DayDivider(first) = &out[0] else {
            panic!("expected divider");
        };
        assert_eq!(first.label, "January 5, 2024");
    }

    #[test]
    fn day_dividers_can_be_disabled() {
        let entries = vec![dated("a", "2024-01-05T08:00:00Z", 0)];
        let opts = ScrapeOptions {
            day_dividers: false,
            ..ScrapeOptions::default()
        };
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["a"]);
    }

    #[test]
    fn equal_timestamps_keep_discovery_order() {
        let entries = vec![
            dated("second", "2024-01-05T08:00:00Z", 1),
            dated("first", "2024-01-05T08:00:00Z", 0),
        ];
        let opts = ScrapeOptions {
            day_dividers: false,
            ..ScrapeOptions::default()
        };
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["first", "second"]);
    }

    #[test]
    fn undated_messages_trail_in_discovery_order() {
        let entries = vec![
            undated("u2", 5e12, 3),
            dated("a", "2024-01-05T08:00:00Z", 0),
            undated("u1", 9e12, 1),
        ];
        let opts = ScrapeOptions {
            start_boundary: Some(ts("2025-01-01T00:00:00Z")),
            ..ScrapeOptions::default()
        };
        // "a" falls before the boundary; undated entries are never excluded.
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["u1", "u2"]);
    }

    #[test]
    fn late_notice_anchors_before_following_message() {
        let a = ts("2024-01-05T08:00:00Z");
        // Notice observed with the time of whatever rendered last, which is
        // later than the message it actually precedes.
        #[allow(clippy::cast_precision_loss)]
        let entries = vec![
            dated("m1", "2024-01-05T07:00:00Z", 0),
            notice("n", Some(a + 60_000), (a - 10) as f64, 1),
            dated("m2", "2024-01-05T08:00:00Z", 2),
        ];
        let opts = ScrapeOptions {
            include_system_dividers: true,
            day_dividers: false,
            ..ScrapeOptions::default()
        };
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["m1", "n", "m2"]);
    }

    #[test]
    fn notice_without_time_anchors_to_next_message() {
        let mut entries = vec![
            notice("n", None, 10.0, 0),
            dated("m", "2024-01-05T08:00:00Z", 1),
        ];
        entries.sort_by(by_order_key);
        anchor_system_evidence(&mut entries);
        let anchored = &entries[0];
        assert_eq!(anchored.anchor_ts, Some(ts("2024-01-05T08:00:00Z")));
        assert!(anchored.order_key < entries[1].order_key);
    }

    #[test]
    fn earlier_notice_keeps_its_own_time() {
        let own = ts("2024-01-05T06:00:00Z");
        #[allow(clippy::cast_precision_loss)]
        let mut entries = vec![
            notice("n", Some(own), own as f64, 0),
            dated("m", "2024-01-05T08:00:00Z", 1),
        ];
        anchor_system_evidence(&mut entries);
        assert_eq!(entries[0].anchor_ts, None);
        assert_eq!(entries[0].resolved_ts(), Some(own));
    }

    #[test]
    fn notices_dropped_unless_requested() {
        let entries = vec![
            notice("n", None, 1.0, 0),
            dated("m", "2024-01-05T08:00:00Z", 1),
        ];
        let opts = ScrapeOptions {
            day_dividers: false,
            ..ScrapeOptions::default()
        };
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["m"]);
    }

    #[test]
    fn generic_notices_dropped_even_when_requested() {
        let mut generic = notice("n", None, 1.0, 0);
        generic.message.text = "system".into();
        let entries = vec![generic, dated("m", "2024-01-05T08:00:00Z", 1)];
        let opts = ScrapeOptions {
            include_system_dividers: true,
            day_dividers: false,
            ..ScrapeOptions::default()
        };
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["m"]);
    }

    #[test]
    fn end_boundary_is_inclusive() {
        let entries = vec![
            dated("a", "2024-01-05T08:00:00Z", 0),
            dated("b", "2024-01-05T09:00:00Z", 1),
        ];
        let opts = ScrapeOptions {
            end_boundary: Some(ts("2024-01-05T08:00:00Z")),
            day_dividers: false,
            ..ScrapeOptions::default()
        };
        assert_eq!(ids(&resolver().resolve(entries, &opts)), ["a"]);
    }

    #[test]
    fn empty_input_empty_output() {
        assert!(resolver().resolve(Vec::new(), &ScrapeOptions::default()).is_empty());
    }
}
