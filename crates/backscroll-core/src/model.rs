//! Records produced by extraction and consumed by the resolver.
//!
//! Two divider classes exist and never mix: [`DividerRecord`] is evidence
//! read off the view and only moves the order context's time cursor, while
//! [`DayDivider`] is emitted fresh by the resolver, one per calendar day in
//! the final transcript.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Author recorded on system notices.
pub const SYSTEM_AUTHOR: &str = "[system]";

// ---------------------------------------------------------------------------
// Message fields
// ---------------------------------------------------------------------------

/// One emoji reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactors: Vec<String>,
}

/// A file, link or image attached to a message.
///
/// Identity for merging is the `(href, label)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl Attachment {
    /// Merge key: attachments with the same target and label are one attachment.
    #[must_use]
    pub fn merge_key(&self) -> (&str, &str) {
        (
            self.href.as_deref().unwrap_or_default(),
            self.label.as_deref().unwrap_or_default(),
        )
    }
}

/// Quoted preview of the message being replied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One logical conversation message.
///
/// `id` is the sole deduplication key and never changes once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub author: String,
    /// Timestamp exactly as the view exposed it (may be empty).
    pub timestamp_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    pub text: String,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyContext>,
    #[serde(default)]
    pub is_system: bool,
}

impl MessageRecord {
    /// A bare message with only identity, author, time and text populated.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        timestamp_ms: Option<i64>,
        text: impl Into<String>,
    ) -> Self {
        let timestamp_text = timestamp_ms
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_default();
        Self {
            id: id.into(),
            author: author.into(),
            timestamp_text,
            timestamp_ms,
            text: text.into(),
            reactions: Vec::new(),
            attachments: Vec::new(),
            edited: false,
            avatar: None,
            reply_to: None,
            is_system: false,
        }
    }
}

/// A view-native date separator, used only as time evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividerRecord {
    pub label: String,
    /// Approximate time the separator stands for, when it could be parsed.
    pub ts_ms: Option<i64>,
}

/// How an aggregated entry participates in ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// A real authored message.
    Message,
    /// A system notice whose position is inferred from neighbouring messages.
    SystemEvidence,
}

/// Best-known state for one identity in the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub message: MessageRecord,
    /// Sort key. Equals `ts_ms` when a timestamp parsed, otherwise a
    /// sequence value that is only meaningful within one pass.
    pub order_key: f64,
    pub ts_ms: Option<i64>,
    pub kind: EntryKind,
    /// Timestamp of the message this entry was anchored before, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_ts: Option<i64>,
    /// Insertion sequence inside the aggregator; assigned on first insert.
    #[serde(default)]
    pub discovery: u64,
}

impl AggregateEntry {
    #[must_use]
    pub fn message(message: MessageRecord, order_key: f64, ts_ms: Option<i64>) -> Self {
        Self {
            message,
            order_key,
            ts_ms,
            kind: EntryKind::Message,
            anchor_ts: None,
            discovery: 0,
        }
    }

    #[must_use]
    pub fn system_evidence(message: MessageRecord, order_key: f64, ts_ms: Option<i64>) -> Self {
        Self {
            message,
            order_key,
            ts_ms,
            kind: EntryKind::SystemEvidence,
            anchor_ts: None,
            discovery: 0,
        }
    }

    /// Timestamp used for final placement: the anchor wins over the
    /// entry's own evidence, which wins over the message's parsed time.
    #[must_use]
    pub fn resolved_ts(&self) -> Option<i64> {
        self.anchor_ts
            .or(self.ts_ms)
            .or(self.message.timestamp_ms)
    }
}

/// Result of extracting one view node.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Divider(DividerRecord),
    Entry(AggregateEntry),
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Synthetic day boundary inserted by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayDivider {
    pub day: NaiveDate,
    pub label: String,
    /// Timestamp of the first message of the day.
    pub ts_ms: i64,
}

/// One element of the final ordered transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    DayDivider(DayDivider),
    Message(MessageRecord),
}

impl TranscriptEntry {
    #[must_use]
    pub const fn as_message(&self) -> Option<&MessageRecord> {
        match self {
            Self::Message(message) => Some(message),
            Self::DayDivider(_) => None,
        }
    }

    #[must_use]
    pub const fn is_day_divider(&self) -> bool {
        matches!(self, Self::DayDivider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_ts_prefers_anchor() {
        let mut entry = AggregateEntry::system_evidence(
            MessageRecord::new("sys", "[system]", None, "joined"),
            10.0,
            Some(10),
        );
        assert_eq!(entry.resolved_ts(), Some(10));
        entry.anchor_ts = Some(50);
        assert_eq!(entry.resolved_ts(), Some(50));
    }

    #[test]
    fn new_message_renders_timestamp_text() {
        let msg = MessageRecord::new("m1", "alice", Some(1_704_456_000_000), "hi");
        assert_eq!(msg.timestamp_text, "2024-01-05T12:00:00.000Z");
        let bare = MessageRecord::new("m2", "alice", None, "hi");
        assert!(bare.timestamp_text.is_empty());
    }

    #[test]
    fn transcript_entry_serializes_with_type_tag() {
        let entry = TranscriptEntry::Message(MessageRecord::new("m1", "alice", None, "hi"));
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["type"], "message");
        assert_eq!(json["id"], "m1");
    }
}
