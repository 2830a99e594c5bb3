//! The scroll control loop.
//!
//! Captures the newest window once, then repeatedly drives the view to its
//! oldest extremity so it loads older history, scanning the materialized
//! window into the aggregator after every command. Scanning is strictly
//! sequential: each pass (including every per-item extraction) completes
//! before the next scroll command is issued.

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregator, MergeOutcome};
use crate::config::{ScrapeOptions, ScrollConfig};
use crate::context::OrderContext;
use crate::error::{ErrorCode, ScrapeError};
use crate::extract::{ItemExtractor, fallback_identity, positional_identities};
use crate::model::{AggregateEntry, Extracted};
use crate::stagnation::{IterationSignals, PassMetrics, StagnationTracker, StopPolicy, StopReason};
use crate::status::{ProgressEvent, StatusSink};
use crate::time::parse_timestamp;
use crate::view::{ConversationView, ScrollPosition, VisibleItem};

/// Summary of the scrolling phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollReport {
    pub iterations: u32,
    pub stop_reason: StopReason,
    /// Times hidden history had to be expanded.
    pub expansions: u32,
    pub sentinel_seen: bool,
}

/// Counters for one scan of the visible window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub inserted: usize,
    pub improved: usize,
    pub dividers: usize,
    pub skipped: usize,
    pub gaps: usize,
}

/// Scan every materialized item into the aggregator.
///
/// Extraction gaps are logged and skipped. Divider evidence only moves the
/// context's time cursor; messages also move its author cursor. Entries the
/// extractor left without an id take the view's identity, else a
/// timestamp-author key, else a key relative to identified neighbours.
///
/// # Errors
///
/// Fails only when the view cannot enumerate its items.
pub async fn scan_visible<V, X>(
    view: &V,
    extractor: &X,
    aggregator: &mut Aggregator,
    ctx: &mut OrderContext,
    options: &ScrapeOptions,
) -> Result<(Vec<VisibleItem<V::Node>>, ScanStats), ScrapeError>
where
    V: ConversationView,
    X: ItemExtractor<V::Node>,
{
    let visible = view.visible_items().await?;
    let mut stats = ScanStats::default();
    let mut captured: Vec<AggregateEntry> = Vec::new();
    let mut keys: Vec<Option<String>> = Vec::new();

    for (position, item) in visible.iter().enumerate() {
        let extracted = match extractor.extract(&item.node, ctx, options).await {
            Ok(Some(extracted)) => extracted,
            Ok(None) => {
                stats.skipped += 1;
                continue;
            }
            Err(err) => {
                stats.gaps += 1;
                tracing::warn!(
                    position,
                    identity = item.identity.as_deref().unwrap_or("-"),
                    code = ErrorCode::ExtractionFailed.code(),
                    error = %err,
                    "extraction gap"
                );
                continue;
            }
        };

        match extracted {
            Extracted::Divider(divider) => {
                stats.dividers += 1;
                if let Some(ts) = divider.ts_ms {
                    ctx.observe_time(ts);
                }
            }
            Extracted::Entry(entry) => {
                if !entry.message.is_system {
                    if let Some(ts) = entry.ts_ms.or(entry.message.timestamp_ms) {
                        ctx.observe_time(ts);
                    }
                    ctx.observe_author(&entry.message.author);
                }
                let key = if entry.message.id.is_empty() {
                    item.identity.clone().or_else(|| {
                        fallback_identity(&entry.message.timestamp_text, &entry.message.author)
                    })
                } else {
                    Some(entry.message.id.clone())
                };
                keys.push(key);
                captured.push(entry);
            }
        }
    }

    let positional = positional_identities(&keys);
    for ((mut entry, key), fallback) in captured.into_iter().zip(keys).zip(positional) {
        entry.message.id = match (key, fallback) {
            (Some(key), _) => key,
            (None, Some(fallback)) => match fallback.alias {
                Some(alias)
                    if !aggregator.contains(&fallback.primary) && aggregator.contains(&alias) =>
                {
                    alias
                }
                _ => fallback.primary,
            },
            (None, None) => String::new(),
        };
        match aggregator.merge(entry) {
            MergeOutcome::Inserted => stats.inserted += 1,
            MergeOutcome::Improved => stats.improved += 1,
            MergeOutcome::Unchanged => {}
        }
    }

    Ok((visible, stats))
}

pub struct ScrollDriver<'a, V, X> {
    view: &'a mut V,
    extractor: &'a X,
    status: &'a dyn StatusSink,
    config: &'a ScrollConfig,
    options: &'a ScrapeOptions,
}

impl<'a, V, X> ScrollDriver<'a, V, X>
where
    V: ConversationView,
    X: ItemExtractor<V::Node>,
{
    pub fn new(
        view: &'a mut V,
        extractor: &'a X,
        status: &'a dyn StatusSink,
        config: &'a ScrollConfig,
        options: &'a ScrapeOptions,
    ) -> Self {
        Self {
            view,
            extractor,
            status,
            config,
            options,
        }
    }

    async fn settle(&mut self, position: ScrollPosition, pause_ms: u64) -> Result<(), ScrapeError> {
        self.view.scroll_to(position).await?;
        self.view.await_repaint().await;
        tokio::time::sleep(std::time::Duration::from_millis(pause_ms)).await;
        Ok(())
    }

    /// Activate every visible expand control, then re-assert the scroll
    /// position, since expansion can make the view jump. Returns how many
    /// controls activated.
    async fn expand_hidden_history(
        &mut self,
        controls: Vec<V::Control>,
    ) -> Result<usize, ScrapeError> {
        tracing::debug!(count = controls.len(), "expanding hidden history");
        let mut activated = 0;
        for control in &controls {
            match self.view.activate(control).await {
                Ok(()) => activated += 1,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to activate hidden-history control");
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(self.config.expand_click_delay_ms))
                .await;
        }
        self.view.scroll_to(ScrollPosition::Oldest).await?;
        self.view.await_repaint().await;
        self.settle(ScrollPosition::Oldest, self.config.expand_settle_ms)
            .await?;
        tokio::time::sleep(std::time::Duration::from_millis(self.config.expand_cooldown_ms)).await;
        Ok(activated)
    }

    /// Drive the view until a stop signal fires.
    ///
    /// # Errors
    ///
    /// Environment failures (container missing, view surface lost) abort.
    pub async fn run(
        &mut self,
        aggregator: &mut Aggregator,
        ctx: &mut OrderContext,
    ) -> Result<ScrollReport, ScrapeError> {
        self.view.locate_container().await?;

        self.settle(ScrollPosition::Newest, self.config.initial_settle_ms)
            .await?;
        let (_, stats) = scan_visible(&*self.view, self.extractor, aggregator, ctx, self.options).await?;
        tracing::debug!(inserted = stats.inserted, "captured newest window");

        let policy = StopPolicy {
            sentinel_passes: self.config.sentinel_stagnation_passes,
            hard_passes: self.config.hard_stagnation_passes,
        };
        let mut tracker = StagnationTracker::new();
        let mut iterations: u32 = 0;
        let mut expansions: u32 = 0;
        let mut fruitless_expansions: u32 = 0;
        let mut sentinel_seen = false;
        let mut last_size = aggregator.len();

        let stop_reason = loop {
            iterations += 1;
            let dwell = self.config.dwell_for(aggregator.len());
            self.view.scroll_to(ScrollPosition::Oldest).await?;
            self.view.await_repaint().await;
            tokio::time::sleep(dwell).await;

            let (visible, stats) =
                scan_visible(&*self.view, self.extractor, aggregator, ctx, self.options).await?;
            if !sentinel_seen && self.view.sentinel_visible().await? {
                tracing::debug!(iteration = iterations, "top sentinel visible");
                sentinel_seen = true;
            }

            let oldest = visible.first();
            let oldest_identity = oldest.and_then(|item| item.identity.clone());
            let oldest_hint = oldest.and_then(|item| item.timestamp_hint.clone());

            // Controls that keep coming back without revealing anything are
            // ignored, so the stagnation counters still bound the run.
            if !visible.is_empty() && fruitless_expansions < self.config.max_fruitless_expansions {
                let controls = self.view.expand_controls().await?;
                if !controls.is_empty() {
                    expansions += 1;
                    let before = aggregator.len();
                    let activated = self.expand_hidden_history(controls).await?;
                    // Expansion can load several pages at once; capture them
                    // before the next scroll moves the window again.
                    let (_, stats) =
                        scan_visible(&*self.view, self.extractor, aggregator, ctx, self.options)
                            .await?;
                    if aggregator.len() > before {
                        fruitless_expansions = 0;
                    } else {
                        fruitless_expansions += 1;
                        tracing::warn!(
                            iteration = iterations,
                            activated,
                            fruitless_expansions,
                            "expansion revealed nothing"
                        );
                    }
                    tracing::debug!(
                        iteration = iterations,
                        inserted = stats.inserted,
                        "scanned after expansion"
                    );
                    tracker.reset();
                    continue;
                }
            }

            let content_height = self.view.content_height().await?;
            let aggregate_grew = aggregator.len() > last_size;
            last_size = aggregator.len();
            if aggregate_grew {
                fruitless_expansions = 0;
            }

            if iterations % self.config.progress_interval.max(1) == 0 {
                self.status.emit(ProgressEvent::Scroll {
                    iteration: iterations,
                    visible: visible.len(),
                    aggregate_size: aggregator.len(),
                    filtered_size: aggregator.filtered_count(self.options),
                    oldest_visible_timestamp: oldest_hint.clone(),
                });
            }

            let stagnant_passes = tracker.observe(&PassMetrics {
                window_len: visible.len(),
                content_height,
                oldest_identity,
                aggregate_grew,
            });
            tracing::debug!(
                iteration = iterations,
                visible = visible.len(),
                inserted = stats.inserted,
                improved = stats.improved,
                aggregate = aggregator.len(),
                stagnant_passes,
                "scroll pass"
            );

            let signals = IterationSignals {
                window_len: visible.len(),
                oldest_visible_ts: oldest_hint.as_deref().and_then(parse_timestamp),
                start_boundary: self.options.start_boundary,
                sentinel_seen,
                aggregate_grew,
                stagnant_passes,
            };
            if let Some(reason) = policy.decide(&signals) {
                tracing::info!(
                    ?reason,
                    iterations,
                    stagnant_passes,
                    aggregate = aggregator.len(),
                    "scroll stop"
                );
                break reason;
            }
        };

        Ok(ScrollReport {
            iterations,
            stop_reason,
            expansions,
            sentinel_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Range;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ExtractError, ViewError};
    use crate::model::MessageRecord;
    use crate::status::NullStatus;
    use crate::time::Calendar;

    type Node = (usize, Option<&'static str>);

    /// A fixed list of untimed messages; only `window` is materialized.
    struct ListView {
        ids: Vec<Option<&'static str>>,
        window: Range<usize>,
        /// Expose one expand control that never activates.
        broken_control: bool,
    }

    impl ListView {
        fn new(ids: &[Option<&'static str>]) -> Self {
            Self {
                ids: ids.to_vec(),
                window: 0..ids.len(),
                broken_control: false,
            }
        }
    }

    #[async_trait]
    impl ConversationView for ListView {
        type Node = Node;
        type Control = ();

        async fn locate_container(&mut self) -> Result<(), ViewError> {
            Ok(())
        }

        async fn scroll_to(&mut self, _position: ScrollPosition) -> Result<(), ViewError> {
            Ok(())
        }

        async fn await_repaint(&mut self) {}

        async fn visible_items(&self) -> Result<Vec<VisibleItem<Node>>, ViewError> {
            Ok(self
                .window
                .clone()
                .map(|i| VisibleItem {
                    node: (i, self.ids[i]),
                    identity: None,
                    timestamp_hint: None,
                })
                .collect())
        }

        async fn content_height(&self) -> Result<u64, ViewError> {
            Ok(u64::try_from(self.ids.len()).unwrap_or(0) * 40)
        }

        async fn expand_controls(&self) -> Result<Vec<()>, ViewError> {
            Ok(if self.broken_control { vec![()] } else { Vec::new() })
        }

        async fn activate(&mut self, _control: &()) -> Result<(), ViewError> {
            Err(ViewError::ControlFailed("control detached".into()))
        }

        async fn sentinel_visible(&self) -> Result<bool, ViewError> {
            Ok(false)
        }

        async fn find_item(&self, _id: &str) -> Result<Option<Node>, ViewError> {
            Ok(None)
        }

        async fn has_reaction_control(&self, _node: &Node) -> bool {
            false
        }
    }

    /// Every message is by the same author and carries no timestamp.
    struct UntimedExtractor;

    #[async_trait]
    impl ItemExtractor<Node> for UntimedExtractor {
        async fn extract(
            &self,
            node: &Node,
            ctx: &mut OrderContext,
            _options: &ScrapeOptions,
        ) -> Result<Option<Extracted>, ExtractError> {
            let (index, id) = *node;
            let message = MessageRecord::new(id.unwrap_or(""), "alice", None, format!("text {index}"));
            Ok(Some(Extracted::Entry(AggregateEntry::message(
                message,
                ctx.next_sequence_key(),
                None,
            ))))
        }
    }

    fn ctx() -> OrderContext {
        OrderContext::new(0.0, Calendar::utc())
    }

    fn texts(aggregator: &Aggregator) -> Vec<String> {
        let mut out: Vec<String> = aggregator
            .entries()
            .iter()
            .map(|e| e.message.text.clone())
            .collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn anonymous_untimed_messages_are_kept_apart_and_rescans_are_idempotent() {
        let view = ListView::new(&[Some("a"), None, None, Some("b")]);
        let mut aggregator = Aggregator::new();
        let options = ScrapeOptions::default();

        let (_, first) = scan_visible(&view, &UntimedExtractor, &mut aggregator, &mut ctx(), &options)
            .await
            .expect("scan");
        assert_eq!(first.inserted, 4);

        let (_, second) = scan_visible(&view, &UntimedExtractor, &mut aggregator, &mut ctx(), &options)
            .await
            .expect("scan");
        assert_eq!(second.inserted, 0);
        assert_eq!(texts(&aggregator), ["text 0", "text 1", "text 2", "text 3"]);
        assert!(aggregator.contains("a+1"));
        assert!(aggregator.contains("a+2"));
    }

    #[tokio::test]
    async fn anonymous_keys_survive_the_older_anchor_loading() {
        let mut view = ListView::new(&[Some("a"), None, None, Some("b")]);
        view.window = 1..4;
        let mut aggregator = Aggregator::new();
        let options = ScrapeOptions::default();

        scan_visible(&view, &UntimedExtractor, &mut aggregator, &mut ctx(), &options)
            .await
            .expect("scan");
        assert!(aggregator.contains("b-2"));

        view.window = 0..4;
        let (_, stats) = scan_visible(&view, &UntimedExtractor, &mut aggregator, &mut ctx(), &options)
            .await
            .expect("scan");
        assert_eq!(stats.inserted, 1, "only the anchor itself is new");
        assert_eq!(aggregator.len(), 4);
        assert_eq!(texts(&aggregator), ["text 0", "text 1", "text 2", "text 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_expand_control_cannot_stall_the_run() {
        let mut view = ListView::new(&[Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]);
        view.broken_control = true;
        let config = ScrollConfig::default();
        let options = ScrapeOptions::default();
        let mut aggregator = Aggregator::new();
        let mut ctx = ctx();

        let mut driver = ScrollDriver::new(&mut view, &UntimedExtractor, &NullStatus, &config, &options);
        let report = tokio::time::timeout(
            Duration::from_secs(24 * 60 * 60),
            driver.run(&mut aggregator, &mut ctx),
        )
        .await
        .expect("run finishes in bounded virtual time")
        .expect("run");

        assert_eq!(report.stop_reason, StopReason::StagnationLimit);
        assert_eq!(report.expansions, config.max_fruitless_expansions);
        assert!(!report.sentinel_seen);
        assert_eq!(aggregator.len(), 5);
    }
}
