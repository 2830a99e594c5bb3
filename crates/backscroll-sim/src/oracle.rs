//! Invariant oracle comparing a scrape against its ground truth.

use std::collections::{HashMap, HashSet};
use std::fmt;

use backscroll_core::config::ScrapeOptions;
use backscroll_core::engine::ScrapeOutcome;
use backscroll_core::model::{MessageRecord, TranscriptEntry};
use backscroll_core::text::is_placeholder_text;
use backscroll_core::time::{Calendar, local_day};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, SimMessage};

// ── Result types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    DuplicateId {
        id: String,
    },
    OutOfOrder {
        earlier: String,
        later: String,
    },
    MisplacedDivider {
        position: usize,
        day: NaiveDate,
    },
    Missing {
        ids: Vec<String>,
    },
    Unexpected {
        id: String,
    },
    PlaceholderText {
        id: String,
    },
    MissingReactions {
        id: String,
    },
    TimestampMismatch {
        id: String,
        expected: Option<i64>,
        actual: Option<i64>,
    },
    AuthorMismatch {
        id: String,
        expected: String,
        actual: String,
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId { id } => write!(f, "DuplicateId: {id} appears more than once"),
            Self::OutOfOrder { earlier, later } => {
                write!(f, "OutOfOrder: {later} is placed after {earlier} but is older")
            }
            Self::MisplacedDivider { position, day } => {
                write!(f, "MisplacedDivider: divider for {day} at position {position}")
            }
            Self::Missing { ids } => write!(f, "Missing: {} message(s): {ids:?}", ids.len()),
            Self::Unexpected { id } => write!(f, "Unexpected: {id} should not be in the output"),
            Self::PlaceholderText { id } => {
                write!(f, "PlaceholderText: {id} kept a placeholder without being reported")
            }
            Self::MissingReactions { id } => {
                write!(f, "MissingReactions: {id} lost its reactions without being reported")
            }
            Self::TimestampMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "TimestampMismatch: {id} expected={expected:?} actual={actual:?}"
            ),
            Self::AuthorMismatch {
                id,
                expected,
                actual,
            } => write!(f, "AuthorMismatch: {id} expected={expected} actual={actual}"),
        }
    }
}

// ── Oracle ──────────────────────────────────────────────────────────────────

pub struct TranscriptOracle<'a> {
    conversation: &'a Conversation,
    options: &'a ScrapeOptions,
    calendar: Calendar,
}

impl<'a> TranscriptOracle<'a> {
    #[must_use]
    pub const fn new(
        conversation: &'a Conversation,
        options: &'a ScrapeOptions,
        calendar: Calendar,
    ) -> Self {
        Self {
            conversation,
            options,
            calendar,
        }
    }

    /// Ground-truth messages the transcript must contain.
    ///
    /// Untimed messages cannot be placed against a start boundary, and the
    /// scroll stops once it passes that boundary, so they are only required
    /// for unbounded runs.
    fn expected(&self) -> Vec<&'a SimMessage> {
        self.conversation
            .messages()
            .filter(|m| {
                if m.timed {
                    self.options.in_bounds(Some(m.at_ms))
                } else {
                    self.options.start_boundary.is_none()
                }
            })
            .collect()
    }

    /// Run every check against `outcome`.
    #[must_use]
    pub fn check_all(&self, outcome: &ScrapeOutcome) -> OracleResult {
        let (entries, exhausted): (&[TranscriptEntry], HashSet<&str>) = match outcome {
            ScrapeOutcome::Completed(transcript) => (
                transcript.entries.as_slice(),
                transcript
                    .report
                    .hydration
                    .exhausted
                    .iter()
                    .map(String::as_str)
                    .collect(),
            ),
            ScrapeOutcome::Empty(_) => (<&[TranscriptEntry]>::default(), HashSet::new()),
        };
        let messages: Vec<&MessageRecord> = entries
            .iter()
            .filter_map(TranscriptEntry::as_message)
            .filter(|m| !m.is_system)
            .collect();

        Self::check_unique(&messages)
            .merge(Self::check_order(&messages))
            .merge(self.check_dividers(entries))
            .merge(self.check_complete(&messages))
            .merge(self.check_fields(&messages, &exhausted))
    }

    fn check_unique(messages: &[&MessageRecord]) -> OracleResult {
        let mut seen = HashSet::new();
        let mut violations = Vec::new();
        for message in messages {
            if !seen.insert(message.id.as_str()) {
                violations.push(InvariantViolation::DuplicateId {
                    id: message.id.clone(),
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    fn check_order(messages: &[&MessageRecord]) -> OracleResult {
        let dated: Vec<&&MessageRecord> = messages.iter().filter(|m| m.timestamp_ms.is_some()).collect();
        let violations = dated
            .windows(2)
            .filter(|w| w[0].timestamp_ms > w[1].timestamp_ms)
            .map(|w| InvariantViolation::OutOfOrder {
                earlier: w[0].id.clone(),
                later: w[1].id.clone(),
            })
            .collect();
        OracleResult::from_violations(violations)
    }

    /// One divider per day, ascending, each followed by messages of that day.
    fn check_dividers(&self, entries: &[TranscriptEntry]) -> OracleResult {
        if !self.options.day_dividers {
            return OracleResult::pass();
        }
        let mut violations = Vec::new();
        let mut seen_days: HashSet<NaiveDate> = HashSet::new();
        let mut current: Option<NaiveDate> = None;
        for (position, entry) in entries.iter().enumerate() {
            match entry {
                TranscriptEntry::DayDivider(divider) => {
                    let ascending = current.is_none_or(|day| day < divider.day);
                    let followed = matches!(
                        entries.get(position + 1),
                        Some(TranscriptEntry::Message(m))
                            if m.timestamp_ms.and_then(|ts| local_day(ts, self.calendar)) == Some(divider.day)
                                || m.is_system
                    );
                    if !seen_days.insert(divider.day) || !ascending || !followed {
                        violations.push(InvariantViolation::MisplacedDivider {
                            position,
                            day: divider.day,
                        });
                    }
                    current = Some(divider.day);
                }
                TranscriptEntry::Message(message) if !message.is_system => {
                    let day = message.timestamp_ms.and_then(|ts| local_day(ts, self.calendar));
                    if let Some(day) = day.filter(|d| Some(*d) != current) {
                        violations.push(InvariantViolation::MisplacedDivider { position, day });
                    }
                }
                TranscriptEntry::Message(_) => {}
            }
        }
        OracleResult::from_violations(violations)
    }

    fn check_complete(&self, messages: &[&MessageRecord]) -> OracleResult {
        let expected = self.expected();
        let expected_ids: HashSet<&str> = expected.iter().map(|m| m.id.as_str()).collect();
        let present: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();

        let mut violations = Vec::new();
        let missing: Vec<String> = expected
            .iter()
            .filter(|m| !present.contains(m.id.as_str()))
            .map(|m| m.id.clone())
            .collect();
        if !missing.is_empty() {
            violations.push(InvariantViolation::Missing { ids: missing });
        }
        for message in messages {
            let known = self.conversation.message(&message.id);
            let allowed = expected_ids.contains(message.id.as_str())
                || known.is_some_and(|m| !m.timed);
            if !allowed {
                violations.push(InvariantViolation::Unexpected {
                    id: message.id.clone(),
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    fn check_fields(&self, messages: &[&MessageRecord], exhausted: &HashSet<&str>) -> OracleResult {
        let truth: HashMap<&str, &SimMessage> =
            self.conversation.messages().map(|m| (m.id.as_str(), m)).collect();
        let mut violations = Vec::new();
        for message in messages {
            let Some(expected) = truth.get(message.id.as_str()) else {
                continue;
            };
            let reported = exhausted.contains(message.id.as_str());

            if is_placeholder_text(&message.text) && !is_placeholder_text(&expected.text) && !reported {
                violations.push(InvariantViolation::PlaceholderText {
                    id: message.id.clone(),
                });
            }
            if self.options.include_reactions
                && message.reactions.is_empty()
                && !expected.reactions.is_empty()
                && !reported
            {
                violations.push(InvariantViolation::MissingReactions {
                    id: message.id.clone(),
                });
            }
            let expected_ts = expected.timed.then_some(expected.at_ms);
            if message.timestamp_ms != expected_ts {
                violations.push(InvariantViolation::TimestampMismatch {
                    id: message.id.clone(),
                    expected: expected_ts,
                    actual: message.timestamp_ms,
                });
            }
            if expected.author_shown && message.author != expected.author {
                violations.push(InvariantViolation::AuthorMismatch {
                    id: message.id.clone(),
                    expected: expected.author.clone(),
                    actual: message.author.clone(),
                });
            }
        }
        OracleResult::from_violations(violations)
    }
}
