//! Reference extractor for [`SimNode`]s.
//!
//! Reads only what the node renders, and leans on the order context the
//! same way a markup extractor would: a hidden author label inherits the
//! last author, a yearless separator borrows the year hint, and an
//! untimed message takes the next sequence key.

use std::collections::HashSet;

use async_trait::async_trait;
use backscroll_core::config::ScrapeOptions;
use backscroll_core::context::OrderContext;
use backscroll_core::error::ExtractError;
use backscroll_core::extract::ItemExtractor;
use backscroll_core::model::{
    AggregateEntry, DividerRecord, Extracted, MessageRecord, SYSTEM_AUTHOR,
};
use backscroll_core::text::normalize_text;
use backscroll_core::time::{parse_control_timestamp, parse_divider_date, parse_timestamp};

use crate::view::{Rendered, SimNode};

#[derive(Debug, Clone, Default)]
pub struct SimExtractor {
    /// Ids the extractor fails on, simulating unparseable markup.
    unreadable: HashSet<String>,
}

impl SimExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_unreadable<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unreadable.extend(ids.into_iter().map(Into::into));
        self
    }
}

#[allow(clippy::cast_precision_loss)]
fn wall_clock_key(ts: i64) -> f64 {
    ts as f64
}

#[async_trait]
impl ItemExtractor<SimNode> for SimExtractor {
    async fn extract(
        &self,
        node: &SimNode,
        ctx: &mut OrderContext,
        options: &ScrapeOptions,
    ) -> Result<Option<Extracted>, ExtractError> {
        match &node.rendered {
            Rendered::Separator { label } => {
                let ts_ms = parse_divider_date(label, ctx.year_hint, ctx.calendar());
                Ok(Some(Extracted::Divider(DividerRecord {
                    label: label.clone(),
                    ts_ms,
                })))
            }

            Rendered::Notice { id, text } => {
                let parsed = parse_control_timestamp(text, ctx.year_hint, ctx.calendar());
                let ts = ctx.approximate_system_time(parsed);
                let mut message = MessageRecord::new(id.clone(), SYSTEM_AUTHOR, parsed, normalize_text(text));
                message.is_system = true;
                Ok(Some(Extracted::Entry(AggregateEntry::system_evidence(
                    message,
                    wall_clock_key(ts),
                    Some(ts),
                ))))
            }

            Rendered::Message {
                id,
                author_label,
                time_text,
                text,
                reactions,
                attachments,
                reply_to,
                edited,
            } => {
                if self.unreadable.contains(id) {
                    return Err(ExtractError::new(id.clone(), "message body unreadable"));
                }

                let author = author_label
                    .clone()
                    .unwrap_or_else(|| ctx.last_author.clone());
                let ts_ms = time_text.as_deref().and_then(parse_timestamp);
                let order_key = match ts_ms {
                    Some(ts) => {
                        ctx.observe_time(ts);
                        wall_clock_key(ts)
                    }
                    None => ctx.next_sequence_key(),
                };
                ctx.observe_author(&author);

                let message = MessageRecord {
                    id: id.clone(),
                    author,
                    timestamp_text: time_text.clone().unwrap_or_default(),
                    timestamp_ms: ts_ms,
                    text: normalize_text(text),
                    reactions: if options.include_reactions {
                        reactions.clone()
                    } else {
                        Vec::new()
                    },
                    attachments: attachments.clone(),
                    edited: *edited,
                    avatar: None,
                    reply_to: if options.include_reply_context {
                        reply_to.clone()
                    } else {
                        None
                    },
                    is_system: false,
                };
                Ok(Some(Extracted::Entry(AggregateEntry::message(
                    message, order_key, ts_ms,
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use backscroll_core::model::EntryKind;
    use backscroll_core::time::Calendar;

    use super::*;

    fn ctx() -> OrderContext {
        OrderContext::new(1.0e13, Calendar::utc())
    }

    fn message_node(id: &str, author: Option<&str>, time: Option<&str>) -> SimNode {
        SimNode {
            index: 0,
            rendered: Rendered::Message {
                id: id.into(),
                author_label: author.map(str::to_string),
                time_text: time.map(str::to_string),
                text: "hello".into(),
                reactions: Vec::new(),
                attachments: Vec::new(),
                reply_to: None,
                edited: false,
            },
        }
    }

    async fn entry(node: &SimNode, ctx: &mut OrderContext) -> AggregateEntry {
        match SimExtractor::new()
            .extract(node, ctx, &ScrapeOptions::default())
            .await
        {
            Ok(Some(Extracted::Entry(entry))) => entry,
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hidden_author_inherits_previous() {
        let mut ctx = ctx();
        entry(&message_node("a", Some("alice"), Some("2024-03-01T09:00:00.000Z")), &mut ctx).await;
        let second = entry(&message_node("b", None, Some("2024-03-01T09:01:00.000Z")), &mut ctx).await;
        assert_eq!(second.message.author, "alice");
    }

    #[tokio::test]
    async fn untimed_message_takes_sequence_key() {
        let mut ctx = ctx();
        let first = entry(&message_node("a", Some("bob"), None), &mut ctx).await;
        let second = entry(&message_node("b", Some("bob"), None), &mut ctx).await;
        assert_eq!(first.ts_ms, None);
        assert!(second.order_key > first.order_key);
    }

    #[tokio::test]
    async fn yearless_separator_uses_year_hint() {
        let mut ctx = ctx();
        entry(&message_node("a", Some("bob"), Some("2023-05-01T09:00:00.000Z")), &mut ctx).await;
        let node = SimNode {
            index: 1,
            rendered: Rendered::Separator {
                label: "7 September".into(),
            },
        };
        let out = SimExtractor::new()
            .extract(&node, &mut ctx, &ScrapeOptions::default())
            .await
            .expect("extract");
        let Some(Extracted::Divider(divider)) = out else {
            panic!("expected divider");
        };
        assert_eq!(divider.ts_ms, parse_timestamp("2023-09-07"));
    }

    #[tokio::test]
    async fn stamped_notice_is_system_evidence() {
        let mut ctx = ctx();
        entry(&message_node("a", Some("bob"), Some("2024-03-01T09:00:00.000Z")), &mut ctx).await;
        let node = SimNode {
            index: 1,
            rendered: Rendered::Notice {
                id: "n1".into(),
                text: "dana started a call 3/1 10:15 AM".into(),
            },
        };
        let notice = entry(&node, &mut ctx).await;
        assert_eq!(notice.kind, EntryKind::SystemEvidence);
        assert!(notice.message.is_system);
        assert_eq!(notice.message.author, SYSTEM_AUTHOR);
        assert_eq!(notice.ts_ms, parse_timestamp("2024-03-01T10:15:00Z"));
    }

    #[tokio::test]
    async fn unreadable_ids_are_extraction_gaps() {
        let extractor = SimExtractor::new().with_unreadable(["a"]);
        let result = extractor
            .extract(
                &message_node("a", Some("bob"), None),
                &mut ctx(),
                &ScrapeOptions::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
