use std::collections::HashSet;

use backscroll_core::config::ScrapeOptions;
use backscroll_core::model::TranscriptEntry;
use backscroll_core::resolve::OrderResolver;
use backscroll_core::time::{Calendar, local_day};
use chrono::{FixedOffset, NaiveDate};
use proptest::prelude::*;

use generators::*;

fn calendar(offset_hours: i32) -> Calendar {
    Calendar::Fixed(FixedOffset::east_opt(offset_hours * 3600).expect("offset"))
}

fn resolver(offset_hours: i32) -> OrderResolver {
    OrderResolver::new(
        calendar(offset_hours),
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date"),
    )
}

fn arb_bounds() -> impl Strategy<Value = (Option<i64>, Option<i64>)> {
    (
        prop::option::of(EPOCH_2024..EPOCH_2024 + SPAN_MS),
        prop::option::of(EPOCH_2024..EPOCH_2024 + SPAN_MS),
    )
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(1000))]

    #[test]
    fn dated_messages_come_out_in_time_order(
        entries in arb_distinct_entries(60),
        offset_hours in -11i32..12,
    ) {
        let options = ScrapeOptions { day_dividers: false, ..ScrapeOptions::default() };
        let out = resolver(offset_hours).resolve(entries, &options);
        let times: Vec<Option<i64>> = out
            .iter()
            .filter_map(TranscriptEntry::as_message)
            .map(|m| m.timestamp_ms)
            .collect();

        // All dated messages first, ascending; undated trail.
        let first_undated = times.iter().position(Option::is_none).unwrap_or(times.len());
        prop_assert!(times[first_undated..].iter().all(Option::is_none));
        prop_assert!(times[..first_undated].windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn one_divider_per_day_before_its_messages(
        entries in arb_distinct_entries(60),
        offset_hours in -11i32..12,
    ) {
        let zone = calendar(offset_hours);
        let out = resolver(offset_hours).resolve(entries, &ScrapeOptions::default());

        let mut seen_days = HashSet::new();
        let mut current_day: Option<NaiveDate> = None;
        for (i, entry) in out.iter().enumerate() {
            match entry {
                TranscriptEntry::DayDivider(divider) => {
                    prop_assert!(seen_days.insert(divider.day), "duplicate divider {}", divider.day);
                    prop_assert!(current_day.is_none_or(|d| d < divider.day));
                    prop_assert!(matches!(out.get(i + 1), Some(TranscriptEntry::Message(_))));
                    current_day = Some(divider.day);
                }
                TranscriptEntry::Message(message) => {
                    if let Some(ts) = message.timestamp_ms {
                        prop_assert_eq!(local_day(ts, zone), current_day);
                    }
                }
            }
        }
    }

    #[test]
    fn bounds_are_honoured(
        entries in arb_distinct_entries(60),
        (start, end) in arb_bounds(),
    ) {
        let total = entries.len();
        let options = ScrapeOptions {
            start_boundary: start,
            end_boundary: end,
            ..ScrapeOptions::default()
        };
        let expected = entries.iter().filter(|e| options.in_bounds(e.ts_ms)).count();
        let out = resolver(0).resolve(entries, &options);
        let messages: Vec<_> = out.iter().filter_map(TranscriptEntry::as_message).collect();

        prop_assert_eq!(messages.len(), expected);
        prop_assert!(messages.len() <= total);
        for message in messages {
            if let (Some(ts), Some(start)) = (message.timestamp_ms, start) {
                prop_assert!(ts >= start);
            }
            if let (Some(ts), Some(end)) = (message.timestamp_ms, end) {
                prop_assert!(ts <= end);
            }
        }
    }

    #[test]
    fn resolve_never_duplicates(entries in arb_distinct_entries(60)) {
        let out = resolver(0).resolve(entries, &ScrapeOptions::default());
        let ids: Vec<&str> = out
            .iter()
            .filter_map(TranscriptEntry::as_message)
            .map(|m| m.id.as_str())
            .collect();
        let unique: HashSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), ids.len());
    }
}
