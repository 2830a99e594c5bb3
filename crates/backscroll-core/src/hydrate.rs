//! Bounded retry pass over sparsely rendered entries.
//!
//! After scrolling stops, some captured messages still hold placeholder text
//! or are missing reactions the view visibly has. Each such entry is
//! re-resolved by identity (never by position) and re-extracted a few times
//! with growing backoff. Whatever is still incomplete afterwards is reported
//! and kept as-is.

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregator;
use crate::config::{HydrationConfig, ScrapeOptions};
use crate::context::OrderContext;
use crate::extract::ItemExtractor;
use crate::model::{EntryKind, Extracted, MessageRecord};
use crate::text::is_placeholder_text;
use crate::time::Calendar;
use crate::view::ConversationView;

/// Outcome of the hydration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationReport {
    /// Entries that needed hydration when the pass started.
    pub candidates: usize,
    /// Entries that became complete.
    pub repaired: usize,
    /// Retry rounds actually run.
    pub attempts: u32,
    /// Identities still incomplete after every retry.
    pub exhausted: Vec<String>,
}

struct Pending<N> {
    id: String,
    /// Last node resolved for the identity; `None` once it left the view.
    node: Option<N>,
}

pub struct Hydrator<'a, V: ConversationView, X> {
    view: &'a V,
    extractor: &'a X,
    options: &'a ScrapeOptions,
    config: &'a HydrationConfig,
    calendar: Calendar,
    sequence_base: f64,
}

impl<'a, V, X> Hydrator<'a, V, X>
where
    V: ConversationView,
    X: ItemExtractor<V::Node>,
{
    pub const fn new(
        view: &'a V,
        extractor: &'a X,
        options: &'a ScrapeOptions,
        config: &'a HydrationConfig,
        calendar: Calendar,
        sequence_base: f64,
    ) -> Self {
        Self {
            view,
            extractor,
            options,
            config,
            calendar,
            sequence_base,
        }
    }

    /// Placeholder text always needs work. Missing reactions only count
    /// while a node is at hand to show the reaction control.
    async fn needs_hydration(&self, message: &MessageRecord, node: Option<&V::Node>) -> bool {
        if is_placeholder_text(&message.text) {
            return true;
        }
        let Some(node) = node else {
            return false;
        };
        self.options.include_reactions
            && message.reactions.is_empty()
            && self.view.has_reaction_control(node).await
    }

    async fn resolve_node(&self, id: &str) -> Option<V::Node> {
        match self.view.find_item(id).await {
            Ok(node) => node,
            Err(err) => {
                tracing::debug!(id, error = %err, "hydration lookup failed");
                None
            }
        }
    }

    async fn collect_pending(&self, aggregator: &Aggregator) -> Vec<Pending<V::Node>> {
        let mut pending = Vec::new();
        for entry in aggregator.entries() {
            if entry.kind != EntryKind::Message || entry.message.is_system {
                continue;
            }
            let node = self.resolve_node(&entry.message.id).await;
            if self.needs_hydration(&entry.message, node.as_ref()).await {
                pending.push(Pending {
                    id: entry.message.id.clone(),
                    node,
                });
            }
        }
        pending
    }

    /// Run the retry loop, merging every re-extraction into `aggregator`.
    pub async fn run(&self, aggregator: &mut Aggregator) -> HydrationReport {
        let mut pending = self.collect_pending(aggregator).await;
        let mut report = HydrationReport {
            candidates: pending.len(),
            ..HydrationReport::default()
        };
        if pending.is_empty() {
            return report;
        }
        tracing::debug!(candidates = pending.len(), "hydrating sparse entries");

        while !pending.is_empty() && report.attempts < self.config.max_attempts {
            tokio::time::sleep(self.config.backoff(report.attempts)).await;
            report.attempts += 1;

            let mut still_pending = Vec::new();
            for task in pending {
                let Some(existing) = aggregator.get(&task.id) else {
                    continue;
                };
                let mut ctx = OrderContext::seeded(
                    self.sequence_base,
                    self.calendar,
                    &existing.message.author,
                    existing.ts_ms.or(existing.message.timestamp_ms),
                );
                let node = self.resolve_node(&task.id).await.or(task.node);

                if let Some(node) = node.as_ref() {
                    match self.extractor.extract(node, &mut ctx, self.options).await {
                        Ok(Some(Extracted::Entry(mut candidate))) => {
                            candidate.message.id.clone_from(&task.id);
                            aggregator.merge(candidate);
                        }
                        Ok(Some(Extracted::Divider(_)) | None) => {}
                        Err(err) => {
                            tracing::debug!(id = %task.id, error = %err, "hydration re-extract failed");
                        }
                    }
                }

                let still_needs = match aggregator.get(&task.id) {
                    Some(merged) => self.needs_hydration(&merged.message, node.as_ref()).await,
                    None => false,
                };
                if still_needs {
                    still_pending.push(Pending { id: task.id, node });
                }
            }
            pending = still_pending;
        }

        report.exhausted = pending.into_iter().map(|task| task.id).collect();
        report.repaired = report.candidates - report.exhausted.len();
        if !report.exhausted.is_empty() {
            tracing::warn!(
                exhausted = report.exhausted.len(),
                ids = ?report.exhausted,
                "entries still incomplete after hydration retries"
            );
        }
        report
    }
}
