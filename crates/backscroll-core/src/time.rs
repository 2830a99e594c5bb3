//! Timestamp parsing, day bucketing and day labels.
//!
//! All instants are epoch milliseconds. Calendar questions ("which day is
//! this message on?") are answered by a caller-supplied [`Calendar`]: either
//! a fixed offset, which buckets identically on every host, or the host's
//! local zone, which follows daylight-saving changes per timestamp.

use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    TimeZone, Utc,
};

pub const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Parse an absolute timestamp as exposed by a view (`datetime` attributes,
/// ISO strings, CLI bounds).
///
/// Accepts RFC 3339, the same with a space instead of `T`, a naive
/// `YYYY-MM-DDTHH:MM[:SS]` (read as UTC) and a bare `YYYY-MM-DD` (UTC
/// midnight).
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    let normalized = value.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|day| day.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
}

/// Zone in which calendar days are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calendar {
    Fixed(FixedOffset),
    /// Host local time, offset looked up per instant.
    Local,
}

impl Calendar {
    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Calendar day of `ts_ms`.
    #[must_use]
    pub fn day_of(self, ts_ms: i64) -> Option<NaiveDate> {
        let dt = DateTime::from_timestamp_millis(ts_ms)?;
        Some(match self {
            Self::Fixed(offset) => dt.with_timezone(&offset).date_naive(),
            Self::Local => dt.with_timezone(&Local).date_naive(),
        })
    }

    /// Epoch milliseconds of a wall-clock reading.
    ///
    /// An ambiguous reading (clocks going back) takes the earlier instant; a
    /// reading inside a gap (clocks going forward) is moved past the gap.
    #[must_use]
    pub fn instant_of(self, local: NaiveDateTime) -> Option<i64> {
        match self {
            Self::Fixed(offset) => earliest_ms(&offset, local),
            Self::Local => earliest_ms(&Local, local),
        }
    }

    /// Today's date in this calendar.
    #[must_use]
    pub fn today(self) -> NaiveDate {
        let now = Utc::now();
        match self {
            Self::Fixed(offset) => now.with_timezone(&offset).date_naive(),
            Self::Local => now.with_timezone(&Local).date_naive(),
        }
    }
}

impl From<FixedOffset> for Calendar {
    fn from(offset: FixedOffset) -> Self {
        Self::Fixed(offset)
    }
}

fn earliest_ms<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<i64> {
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            local
                .checked_add_signed(TimeDelta::hours(1))
                .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
        })
        .map(|dt| dt.timestamp_millis())
}

/// Calendar day of `ts_ms` in `calendar`.
#[must_use]
pub fn local_day(ts_ms: i64, calendar: Calendar) -> Option<NaiveDate> {
    calendar.day_of(ts_ms)
}

/// Epoch milliseconds of local midnight starting `day`.
#[must_use]
pub fn day_start_ms(day: NaiveDate, calendar: Calendar) -> Option<i64> {
    calendar.instant_of(day.and_time(NaiveTime::MIN))
}

/// Calendar year of `ts_ms`, used as the order context's year hint.
#[must_use]
pub fn year_of(ts_ms: i64, calendar: Calendar) -> Option<i32> {
    calendar.day_of(ts_ms).map(|day| day.year())
}

/// Label for a day relative to `today`.
///
/// "Today", "Yesterday", "Tomorrow", the weekday name within six days either
/// side, otherwise a long date such as "January 5, 2024".
#[must_use]
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    let diff = (today - day).num_days();
    match diff {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        -1 => "Tomorrow".to_string(),
        -6..=6 => day.format("%A").to_string(),
        _ => day.format("%B %-d, %Y").to_string(),
    }
}

fn month_index(token: &str) -> Option<u32> {
    let lower = token.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == lower)
        .and_then(|idx| u32::try_from(idx + 1).ok())
}

fn default_year(year_hint: Option<i32>) -> i32 {
    year_hint.unwrap_or_else(|| Utc::now().year())
}

/// Parse a view-native date separator label into local midnight.
///
/// Understands "September 7", "Monday, September 7, 2024", "7 September"
/// and "7 September 2024". A missing year comes from `year_hint`, falling back
/// to the current year.
#[must_use]
pub fn parse_divider_date(text: &str, year_hint: Option<i32>, calendar: Calendar) -> Option<i64> {
    let clean = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.is_empty() {
        return None;
    }

    // Drop a leading "Weekday," when present.
    let body = match clean.split_once(',') {
        Some((head, tail)) if head.chars().all(char::is_alphabetic) && month_index(head).is_none() => {
            tail.trim()
        }
        _ => clean.as_str(),
    };

    let tokens: Vec<&str> = body
        .split([' ', ','])
        .filter(|t| !t.is_empty())
        .collect();

    let (day, month, year) = match tokens.as_slice() {
        [m, d] if month_index(m).is_some() => (d.parse::<u32>().ok()?, month_index(m)?, None),
        [m, d, y] if month_index(m).is_some() => (
            d.parse::<u32>().ok()?,
            month_index(m)?,
            Some(y.parse::<i32>().ok()?),
        ),
        [d, m] => (d.parse::<u32>().ok()?, month_index(m)?, None),
        [d, m, y] => (
            d.parse::<u32>().ok()?,
            month_index(m)?,
            Some(y.parse::<i32>().ok()?),
        ),
        _ => return None,
    };

    let year = year.unwrap_or_else(|| default_year(year_hint));
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    day_start_ms(date, calendar)
}

/// Parse an "M/D h:mm AM" stamp embedded anywhere inside a system notice.
#[must_use]
pub fn parse_control_timestamp(
    text: &str,
    year_hint: Option<i32>,
    calendar: Calendar,
) -> Option<i64> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (idx, token) in tokens.iter().enumerate() {
        let Some((month, day)) = token.split_once('/') else {
            continue;
        };
        let (Ok(month), Ok(day)) = (month.parse::<u32>(), day.parse::<u32>()) else {
            continue;
        };
        let Some(clock) = tokens.get(idx + 1) else {
            continue;
        };

        // Period may be glued to the clock ("5:30PM") or the next token.
        let upper = clock.to_uppercase();
        let (clock, period) = if let Some(c) = upper.strip_suffix("AM") {
            (c.to_string(), Some("AM".to_string()))
        } else if let Some(c) = upper.strip_suffix("PM") {
            (c.to_string(), Some("PM".to_string()))
        } else {
            (upper.clone(), tokens.get(idx + 2).map(|p| p.to_uppercase()))
        };
        let Some((hour, minute)) = clock.split_once(':') else {
            continue;
        };
        let (Ok(mut hour), Ok(minute)) = (hour.parse::<u32>(), minute.parse::<u32>()) else {
            continue;
        };
        match period.as_deref() {
            Some("PM") if hour < 12 => hour += 12,
            Some("AM") if hour == 12 => hour = 0,
            Some("AM" | "PM") => {}
            _ => continue,
        }

        let date = NaiveDate::from_ymd_opt(default_year(year_hint), month, day)?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        return calendar.instant_of(date.and_time(time));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> Calendar {
        Calendar::utc()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_iso_variants() {
        assert_eq!(parse_timestamp("2024-01-05T12:00:00Z"), Some(1_704_456_000_000));
        assert_eq!(parse_timestamp("2024-01-05 12:00:00Z"), Some(1_704_456_000_000));
        assert_eq!(parse_timestamp("2024-01-05T12:00"), Some(1_704_456_000_000));
        assert_eq!(parse_timestamp("2024-01-05"), Some(1_704_412_800_000));
        assert_eq!(parse_timestamp("yesterday-ish"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn local_day_respects_offset() {
        // 23:30 UTC on Jan 5 is already Jan 6 at +02:00.
        let ts = parse_timestamp("2024-01-05T23:30:00Z").expect("ts");
        let plus_two = Calendar::Fixed(FixedOffset::east_opt(2 * 3600).expect("offset"));
        assert_eq!(local_day(ts, utc()), Some(ymd(2024, 1, 5)));
        assert_eq!(local_day(ts, plus_two), Some(ymd(2024, 1, 6)));
    }

    #[test]
    fn fixed_calendar_midnight_and_year() {
        let minus_five = Calendar::from(FixedOffset::west_opt(5 * 3600).expect("offset"));
        assert_eq!(
            day_start_ms(ymd(2024, 1, 1), minus_five),
            parse_timestamp("2024-01-01T05:00:00Z")
        );
        // 02:00 UTC on Jan 1 is still New Year's Eve at -05:00.
        let ts = parse_timestamp("2024-01-01T02:00:00Z").expect("ts");
        assert_eq!(year_of(ts, minus_five), Some(2023));
        assert_eq!(year_of(ts, utc()), Some(2024));
    }

    #[test]
    fn day_labels_relative_to_today() {
        let today = ymd(2024, 1, 10); // Wednesday
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(ymd(2024, 1, 9), today), "Yesterday");
        assert_eq!(day_label(ymd(2024, 1, 11), today), "Tomorrow");
        assert_eq!(day_label(ymd(2024, 1, 5), today), "Friday");
        assert_eq!(day_label(ymd(2024, 1, 3), today), "January 3, 2024");
    }

    #[test]
    fn divider_dates_with_and_without_year() {
        let expected = day_start_ms(ymd(2024, 9, 7), utc());
        assert_eq!(parse_divider_date("September 7", Some(2024), utc()), expected);
        assert_eq!(parse_divider_date("7 September", Some(2024), utc()), expected);
        assert_eq!(parse_divider_date("7 September 2024", Some(1999), utc()), expected);
        assert_eq!(
            parse_divider_date("Saturday, September 7, 2024", None, utc()),
            expected
        );
        assert_eq!(parse_divider_date("Someone joined", Some(2024), utc()), None);
        assert_eq!(parse_divider_date("February 30", Some(2024), utc()), None);
    }

    #[test]
    fn control_timestamps_in_notice_text() {
        let ts = parse_control_timestamp("Meeting ended: 3/14 5:30 PM after 1h", Some(2024), utc());
        assert_eq!(ts, parse_timestamp("2024-03-14T17:30:00Z"));
        let ts = parse_control_timestamp("Call started 1/2 12:05AM", Some(2024), utc());
        assert_eq!(ts, parse_timestamp("2024-01-02T00:05:00Z"));
        assert_eq!(parse_control_timestamp("no time here", Some(2024), utc()), None);
    }
}
