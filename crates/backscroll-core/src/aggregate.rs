//! Identity-keyed aggregation across repeated scan passes.
//!
//! A virtualized view re-renders items it has already shown, often in a
//! degraded state (placeholder text, reactions not yet painted). Every
//! observation is therefore merged field by field into the best-known record;
//! nothing is ever overwritten blindly and nothing is ever removed.
//!
//! # Field preference
//!
//! | Field | Candidate wins when |
//! |-------|---------------------|
//! | text | real text over placeholder, then longer text |
//! | reactions | more reactions, or same number with higher total count |
//! | attachments | union keyed by `(href, label)` |
//! | reply context, avatar, author, timestamp | existing value is absent |
//! | edited, system | either side says so |

use std::collections::HashMap;

use crate::config::ScrapeOptions;
use crate::extract::fallback_identity;
use crate::model::{AggregateEntry, Attachment, MessageRecord, Reaction};
use crate::text::prefer_text;

/// Merge another observation of the same identity into `self`.
pub trait Merge {
    fn merge(&mut self, other: Self);
}

fn reaction_weight(reactions: &[Reaction]) -> (usize, u64) {
    let total = reactions.iter().map(|r| u64::from(r.count)).sum();
    (reactions.len(), total)
}

fn merge_attachments(existing: &mut Vec<Attachment>, incoming: Vec<Attachment>) {
    for attachment in incoming {
        let slot = existing
            .iter_mut()
            .find(|known| known.merge_key() == attachment.merge_key());
        match slot {
            Some(known) => {
                if known.kind.is_none() {
                    known.kind = attachment.kind;
                }
                if known.size.is_none() {
                    known.size = attachment.size;
                }
            }
            None => existing.push(attachment),
        }
    }
}

impl Merge for MessageRecord {
    fn merge(&mut self, other: Self) {
        let text = prefer_text(&self.text, &other.text).to_string();
        self.text = text;

        if self.author.is_empty() {
            self.author = other.author;
        }
        if self.timestamp_text.is_empty() {
            self.timestamp_text = other.timestamp_text;
        }
        self.timestamp_ms = self.timestamp_ms.or(other.timestamp_ms);

        if reaction_weight(&other.reactions) > reaction_weight(&self.reactions) {
            self.reactions = other.reactions;
        }
        merge_attachments(&mut self.attachments, other.attachments);

        self.edited |= other.edited;
        self.is_system |= other.is_system;
        if self.avatar.is_none() {
            self.avatar = other.avatar;
        }
        if self.reply_to.is_none() {
            self.reply_to = other.reply_to;
        }
    }
}

impl Merge for AggregateEntry {
    fn merge(&mut self, other: Self) {
        // A wall-clock key beats a per-pass sequence key.
        if self.ts_ms.is_none() && other.ts_ms.is_some() {
            self.ts_ms = other.ts_ms;
            self.order_key = other.order_key;
        }
        self.message.merge(other.message);
    }
}

/// What a merge did to the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting of this identity.
    Inserted,
    /// Known identity; at least one field got better.
    Improved,
    /// Known identity; nothing new.
    Unchanged,
}

/// Map from stable identity to the best-known entry for one scrape run.
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    entries: HashMap<String, AggregateEntry>,
    next_discovery: u64,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&AggregateEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a first sighting or merge into the known entry.
    pub fn merge(&mut self, mut candidate: AggregateEntry) -> MergeOutcome {
        if candidate.message.id.is_empty() {
            candidate.message.id = fallback_identity(
                &candidate.message.timestamp_text,
                &candidate.message.author,
            )
            .unwrap_or_else(|| format!("seq-{}", self.next_discovery));
        }

        if let Some(existing) = self.entries.get_mut(&candidate.message.id) {
            let before = existing.clone();
            existing.merge(candidate);
            if *existing == before {
                MergeOutcome::Unchanged
            } else {
                tracing::trace!(id = %existing.message.id, "aggregate entry improved");
                MergeOutcome::Improved
            }
        } else {
            candidate.discovery = self.next_discovery;
            self.next_discovery += 1;
            self.entries.insert(candidate.message.id.clone(), candidate);
            MergeOutcome::Inserted
        }
    }

    /// Entries in the order they were first discovered.
    #[must_use]
    pub fn entries(&self) -> Vec<&AggregateEntry> {
        let mut out: Vec<&AggregateEntry> = self.entries.values().collect();
        out.sort_by_key(|entry| entry.discovery);
        out
    }

    /// Consume the aggregator, yielding entries in discovery order.
    #[must_use]
    pub fn into_entries(self) -> Vec<AggregateEntry> {
        let mut out: Vec<AggregateEntry> = self.entries.into_values().collect();
        out.sort_by_key(|entry| entry.discovery);
        out
    }

    /// Entries that would survive the caller's date bounds. Entries with no
    /// timestamp count as in range.
    #[must_use]
    pub fn filtered_count(&self, options: &ScrapeOptions) -> usize {
        self.entries
            .values()
            .filter(|entry| options.in_bounds(entry.ts_ms.or(entry.message.timestamp_ms)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, text: &str) -> MessageRecord {
        MessageRecord::new(id, "alice", Some(1_000), text)
    }

    fn entry(message: MessageRecord) -> AggregateEntry {
        let ts = message.timestamp_ms;
        AggregateEntry::message(message, 1_000.0, ts)
    }

    fn reaction(emoji: &str, count: u32) -> Reaction {
        Reaction {
            emoji: emoji.to_string(),
            count,
            reactors: Vec::new(),
        }
    }

    #[test]
    fn first_sighting_inserts() {
        let mut agg = Aggregator::new();
        assert_eq!(agg.merge(entry(msg("m1", "hello"))), MergeOutcome::Inserted);
        assert_eq!(agg.len(), 1);
        assert!(agg.contains("m1"));
    }

    #[test]
    fn repeat_sighting_is_unchanged() {
        let mut agg = Aggregator::new();
        agg.merge(entry(msg("m1", "hello")));
        assert_eq!(agg.merge(entry(msg("m1", "hello"))), MergeOutcome::Unchanged);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn degraded_render_does_not_erase_detail() {
        let mut agg = Aggregator::new();
        let mut full = msg("m1", "hello world");
        full.reactions = vec![reaction("👍", 2)];
        full.reply_to = Some(crate::model::ReplyContext {
            author: "bob".into(),
            timestamp: None,
            text: "earlier".into(),
            id: None,
        });
        agg.merge(entry(full));

        let degraded = msg("m1", "Loading...");
        assert_eq!(agg.merge(entry(degraded)), MergeOutcome::Unchanged);

        let kept = agg.get("m1").expect("entry");
        assert_eq!(kept.message.text, "hello world");
        assert_eq!(kept.message.reactions.len(), 1);
        assert!(kept.message.reply_to.is_some());
    }

    #[test]
    fn placeholder_upgrades_to_real_text_and_more_reactions() {
        let mut agg = Aggregator::new();
        let mut first = msg("m1", "Loading...");
        first.reactions = vec![reaction("👍", 1)];
        agg.merge(entry(first));

        let mut later = msg("m1", "the real text");
        later.reactions = vec![reaction("👍", 1), reaction("🎉", 3)];
        assert_eq!(agg.merge(entry(later)), MergeOutcome::Improved);

        let mut stale = msg("m1", "Loading");
        stale.reactions = vec![reaction("👍", 1)];
        agg.merge(entry(stale));

        let kept = agg.get("m1").expect("entry");
        assert_eq!(kept.message.text, "the real text");
        assert_eq!(kept.message.reactions.len(), 2);
    }

    #[test]
    fn attachments_union_by_target_and_label() {
        let att = |href: &str, label: &str| Attachment {
            href: Some(href.to_string()),
            label: Some(label.to_string()),
            kind: None,
            size: None,
        };
        let mut agg = Aggregator::new();
        let mut first = msg("m1", "files");
        first.attachments = vec![att("https://x/a", "a.pdf")];
        agg.merge(entry(first));

        let mut second = msg("m1", "files");
        let mut sized = att("https://x/a", "a.pdf");
        sized.size = Some("2 MB".into());
        second.attachments = vec![sized, att("https://x/b", "b.png")];
        agg.merge(entry(second));

        let kept = agg.get("m1").expect("entry");
        assert_eq!(kept.message.attachments.len(), 2);
        assert_eq!(kept.message.attachments[0].size.as_deref(), Some("2 MB"));
    }

    #[test]
    fn wall_clock_key_replaces_sequence_key() {
        let mut agg = Aggregator::new();
        let untimed = MessageRecord::new("m1", "alice", None, "hi");
        agg.merge(AggregateEntry::message(untimed, 9e12, None));
        agg.merge(entry(msg("m1", "hi")));
        let kept = agg.get("m1").expect("entry");
        assert_eq!(kept.ts_ms, Some(1_000));
        assert!((kept.order_key - 1_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_id_gets_fallback_identity() {
        let mut agg = Aggregator::new();
        let anon = MessageRecord::new("", "alice", Some(1_704_456_000_000), "hi");
        agg.merge(entry(anon));
        assert!(agg.contains("2024-01-05T12:00:00.000Z#alice"));
    }

    #[test]
    fn untimed_anonymous_messages_stay_distinct() {
        let mut agg = Aggregator::new();
        let first = MessageRecord::new("", "alice", None, "first");
        let second = MessageRecord::new("", "alice", None, "second message");
        assert_eq!(agg.merge(AggregateEntry::message(first, 1.0, None)), MergeOutcome::Inserted);
        assert_eq!(agg.merge(AggregateEntry::message(second, 2.0, None)), MergeOutcome::Inserted);

        let texts: Vec<_> = agg.entries().iter().map(|e| e.message.text.clone()).collect();
        assert_eq!(texts, ["first", "second message"]);
    }

    #[test]
    fn discovery_order_is_preserved() {
        let mut agg = Aggregator::new();
        for id in ["c", "a", "b"] {
            agg.merge(entry(msg(id, "x")));
        }
        agg.merge(entry(msg("a", "xx")));
        let ids: Vec<_> = agg.entries().iter().map(|e| e.message.id.clone()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn filtered_count_respects_bounds() {
        let mut agg = Aggregator::new();
        agg.merge(AggregateEntry::message(MessageRecord::new("old", "a", Some(10), "x"), 10.0, Some(10)));
        agg.merge(AggregateEntry::message(MessageRecord::new("new", "a", Some(500), "x"), 500.0, Some(500)));
        agg.merge(AggregateEntry::message(MessageRecord::new("untimed", "a", None, "x"), 1e12, None));
        let opts = ScrapeOptions {
            start_boundary: Some(100),
            ..ScrapeOptions::default()
        };
        assert_eq!(agg.filtered_count(&opts), 2);
    }
}
