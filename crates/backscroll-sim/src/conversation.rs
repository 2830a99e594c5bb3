//! Seeded ground-truth conversations.
//!
//! A conversation is the full history a view would eventually reveal: date
//! separators, system notices and messages, oldest first. Rendering faults
//! live in [`crate::view`]; nothing here knows about scrolling.

use backscroll_core::model::{Attachment, Reaction, ReplyContext};
use backscroll_core::time::MS_PER_DAY;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

const AUTHORS: &[&str] = &["alice", "bob", "carol", "dana", "erin"];
const WORDS: &[&str] = &[
    "deploy", "review", "lunch", "ticket", "build", "green", "again", "ship", "friday", "roadmap",
    "meeting", "moved", "notes", "draft", "thanks", "looks", "good", "blocked", "on", "the",
];
const EMOJI: &[&str] = &["👍", "🎉", "❤️", "😂", "👀"];

/// 09:00 local, where each day's traffic starts.
const DAY_OPEN_MS: i64 = 9 * 3_600_000;
/// Length of the busy part of a day.
const DAY_SPAN_MINUTES: u64 = 12 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Midnight (UTC) of the first day.
    pub start_ms: i64,
    pub days: u32,
    pub min_per_day: u32,
    pub max_per_day: u32,
    /// Days with no traffic at all (and so no separator).
    pub quiet_day_percent: u8,
    pub notice_percent: u8,
    /// Messages the view renders without any timestamp.
    pub untimed_percent: u8,
    /// Chance a message continues the previous author's run.
    pub same_author_percent: u8,
    /// Chance a continued run hides the repeated author label.
    pub unlabeled_author_percent: u8,
    pub reaction_percent: u8,
    pub attachment_percent: u8,
    pub reply_percent: u8,
    pub edited_percent: u8,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            // 2024-03-01T00:00:00Z
            start_ms: 1_709_251_200_000,
            days: 6,
            min_per_day: 4,
            max_per_day: 14,
            quiet_day_percent: 15,
            notice_percent: 8,
            untimed_percent: 5,
            same_author_percent: 40,
            unlabeled_author_percent: 50,
            reaction_percent: 25,
            attachment_percent: 10,
            reply_percent: 10,
            edited_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimMessage {
    pub id: String,
    pub author: String,
    /// True send time, whether or not the view shows it.
    pub at_ms: i64,
    pub timed: bool,
    pub author_shown: bool,
    pub text: String,
    pub reactions: Vec<Reaction>,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<ReplyContext>,
    pub edited: bool,
}

impl SimMessage {
    /// Machine-readable timestamp the view attaches to the node.
    #[must_use]
    pub fn time_text(&self) -> Option<String> {
        if !self.timed {
            return None;
        }
        DateTime::from_timestamp_millis(self.at_ms)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimItem {
    Separator { day: NaiveDate, label: String },
    Notice { id: String, text: String, at_ms: i64 },
    Message(SimMessage),
}

impl SimItem {
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Separator { .. } => None,
            Self::Notice { id, .. } => Some(id),
            Self::Message(message) => Some(&message.id),
        }
    }

    #[must_use]
    pub const fn as_message(&self) -> Option<&SimMessage> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub seed: u64,
    /// Oldest first.
    pub items: Vec<SimItem>,
}

impl Conversation {
    pub fn messages(&self) -> impl Iterator<Item = &SimMessage> {
        self.items.iter().filter_map(SimItem::as_message)
    }

    #[must_use]
    pub fn message(&self, id: &str) -> Option<&SimMessage> {
        self.messages().find(|m| m.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn separator_label(day: NaiveDate, rng: &mut DeterministicRng) -> String {
    match rng.next_bounded(3) {
        0 => day.format("%A, %B %-d, %Y").to_string(),
        1 => day.format("%B %-d").to_string(),
        _ => day.format("%-d %B").to_string(),
    }
}

fn sentence(rng: &mut DeterministicRng) -> String {
    let len = rng.range_inclusive(2, 9);
    (0..len)
        .filter_map(|_| rng.pick(WORDS).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn reactions(rng: &mut DeterministicRng) -> Vec<Reaction> {
    let count = rng.range_inclusive(1, 3);
    let mut out: Vec<Reaction> = Vec::new();
    for _ in 0..count {
        let Some(emoji) = rng.pick(EMOJI) else {
            continue;
        };
        if out.iter().any(|r| r.emoji == *emoji) {
            continue;
        }
        let voters = rng.range_inclusive(1, 4);
        out.push(Reaction {
            emoji: (*emoji).to_string(),
            count: u32::try_from(voters).unwrap_or(1),
            reactors: AUTHORS
                .iter()
                .take(usize::try_from(voters).unwrap_or(1))
                .map(|a| (*a).to_string())
                .collect(),
        });
    }
    out
}

fn attachments(n: usize, rng: &mut DeterministicRng) -> Vec<Attachment> {
    let count = rng.range_inclusive(1, 2);
    (0..count)
        .map(|i| Attachment {
            href: Some(format!("https://files.example/{n}/{i}")),
            label: Some(format!("file-{n}-{i}.pdf")),
            kind: Some("file".into()),
            size: Some(format!("{} KB", rng.range_inclusive(4, 900))),
        })
        .collect()
}

/// Build the ground truth for `seed`.
#[must_use]
pub fn generate_conversation(seed: u64, config: &ConversationConfig) -> Conversation {
    let mut rng = DeterministicRng::new(seed);
    let mut items = Vec::new();
    let mut message_n: usize = 0;
    let mut notice_n: usize = 0;
    let mut last_author: Option<&str> = None;
    let mut earlier: Vec<(String, String, Option<String>, String)> = Vec::new();

    for d in 0..config.days {
        if rng.hit_rate_percent(config.quiet_day_percent) {
            continue;
        }
        let day_start = config.start_ms + i64::from(d) * MS_PER_DAY;
        let Some(day) = DateTime::from_timestamp_millis(day_start).map(|dt| dt.date_naive()) else {
            continue;
        };
        let count = rng.range_inclusive(
            u64::from(config.min_per_day),
            u64::from(config.max_per_day.max(config.min_per_day)),
        );
        if count == 0 {
            continue;
        }

        let mut offsets: Vec<i64> = (0..count)
            .map(|_| {
                let minute = rng.next_bounded(DAY_SPAN_MINUTES);
                DAY_OPEN_MS + i64::try_from(minute).unwrap_or(0) * 60_000
            })
            .collect();
        offsets.sort_unstable();
        for i in 1..offsets.len() {
            if offsets[i] <= offsets[i - 1] {
                offsets[i] = offsets[i - 1] + 7_000;
            }
        }

        items.push(SimItem::Separator {
            day,
            label: separator_label(day, &mut rng),
        });

        for offset in offsets {
            let at_ms = day_start + offset;

            if rng.hit_rate_percent(config.notice_percent) {
                notice_n += 1;
                let who = rng.pick(AUTHORS).copied().unwrap_or("someone");
                // Half the notices carry their own control stamp.
                let text = if rng.hit_rate_percent(50) {
                    let stamp = at_ms - 60_000;
                    let stamp = DateTime::from_timestamp_millis(stamp).map_or_else(String::new, |dt| {
                        format!(
                            "{}/{} {}",
                            dt.month(),
                            dt.day(),
                            dt.format("%-I:%M %p")
                        )
                    });
                    format!("{who} started a call {stamp}")
                } else {
                    format!("{who} renamed the conversation")
                };
                items.push(SimItem::Notice {
                    id: format!("notice-{notice_n}"),
                    text,
                    at_ms: at_ms - 60_000,
                });
            }

            let continues = last_author.is_some() && rng.hit_rate_percent(config.same_author_percent);
            let author = if continues {
                last_author.unwrap_or("alice")
            } else {
                rng.pick(AUTHORS).copied().unwrap_or("alice")
            };
            let author_shown = !(continues && rng.hit_rate_percent(config.unlabeled_author_percent));
            last_author = Some(author);

            message_n += 1;
            let id = format!("msg-{message_n}");
            let text = sentence(&mut rng);
            let timed = !rng.hit_rate_percent(config.untimed_percent);

            let reply_to = if !earlier.is_empty() && rng.hit_rate_percent(config.reply_percent) {
                rng.pick(&earlier).map(|(rid, rauthor, rts, rtext)| ReplyContext {
                    author: rauthor.clone(),
                    timestamp: rts.clone(),
                    text: rtext.clone(),
                    id: Some(rid.clone()),
                })
            } else {
                None
            };

            let message = SimMessage {
                id: id.clone(),
                author: author.to_string(),
                at_ms,
                timed,
                author_shown,
                text: text.clone(),
                reactions: if rng.hit_rate_percent(config.reaction_percent) {
                    reactions(&mut rng)
                } else {
                    Vec::new()
                },
                attachments: if rng.hit_rate_percent(config.attachment_percent) {
                    attachments(message_n, &mut rng)
                } else {
                    Vec::new()
                },
                reply_to,
                edited: rng.hit_rate_percent(config.edited_percent),
            };
            earlier.push((id, author.to_string(), message.time_text(), text));
            items.push(SimItem::Message(message));
        }
    }

    Conversation { seed, items }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_conversation() {
        let config = ConversationConfig::default();
        assert_eq!(
            generate_conversation(11, &config),
            generate_conversation(11, &config)
        );
    }

    #[test]
    fn messages_are_chronological_and_unique() {
        let conversation = generate_conversation(5, &ConversationConfig::default());
        let messages: Vec<_> = conversation.messages().collect();
        assert!(!messages.is_empty());
        assert!(messages.windows(2).all(|w| w[0].at_ms < w[1].at_ms));
        let mut ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), messages.len());
    }

    #[test]
    fn every_day_opens_with_a_separator() {
        let conversation = generate_conversation(2, &ConversationConfig::default());
        assert!(matches!(
            conversation.items.first(),
            Some(SimItem::Separator { .. })
        ));
    }

    #[test]
    fn first_author_label_is_always_shown() {
        for seed in 0..20 {
            let conversation = generate_conversation(seed, &ConversationConfig::default());
            if let Some(first) = conversation.messages().next() {
                assert!(first.author_shown);
            }
        }
    }

    #[test]
    fn all_quiet_days_give_an_empty_conversation() {
        let config = ConversationConfig {
            quiet_day_percent: 100,
            ..ConversationConfig::default()
        };
        assert!(generate_conversation(1, &config).is_empty());
    }
}
