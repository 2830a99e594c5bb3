//! In-memory virtualized view over a [`Conversation`].
//!
//! # Model
//!
//! Items `loaded_from..len` are loaded. Only `window` of them are
//! materialized at a time: the newest ones while positioned at the newest
//! extremity, the oldest loaded ones while at the top. Scrolling to the top
//! asks for one more page of history, which arrives on the next repaint
//! unless the load stalls. An optional collapsed-history gate stops loading
//! until its expand control is activated.
//!
//! Rendering is time-dependent. A freshly materialized message may show
//! `Loading...` and no reactions until its per-item render delay has passed
//! on the tokio clock. Run under a paused clock, everything is deterministic
//! for a given seed.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use async_trait::async_trait;
use backscroll_core::error::ViewError;
use backscroll_core::model::{Attachment, Reaction, ReplyContext};
use backscroll_core::view::{ConversationView, ScrollPosition, VisibleItem};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::conversation::{Conversation, SimItem};
use crate::rng::DeterministicRng;

pub const PLACEHOLDER_TEXT: &str = "Loading...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Materialized items at any time.
    pub window: usize,
    /// Items revealed per successful load. Must not exceed `window`.
    pub page: usize,
    /// Chance a requested load does not arrive on this repaint.
    pub stall_percent: u8,
    /// Hide older history behind an expand control.
    pub collapsed_history: bool,
    pub slow_render_percent: u8,
    pub min_render_delay_ms: u64,
    pub max_render_delay_ms: u64,
    /// Messages that never finish rendering their text.
    pub stuck_placeholder_percent: u8,
    pub late_reaction_percent: u8,
    pub max_reaction_delay_ms: u64,
    /// Every scroll command re-creates the materialized nodes.
    pub rerender_on_scroll: bool,
    /// The newest window finished rendering before the scrape started.
    pub prerendered: bool,
    pub missing_container: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            window: 12,
            page: 5,
            stall_percent: 15,
            collapsed_history: true,
            slow_render_percent: 10,
            min_render_delay_ms: 1,
            max_render_delay_ms: 1_200,
            stuck_placeholder_percent: 0,
            late_reaction_percent: 20,
            max_reaction_delay_ms: 600,
            rerender_on_scroll: false,
            prerendered: true,
            missing_container: false,
        }
    }
}

/// A snapshot of one node as rendered at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimNode {
    pub index: usize,
    pub rendered: Rendered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Separator {
        label: String,
    },
    Notice {
        id: String,
        text: String,
    },
    Message {
        id: String,
        author_label: Option<String>,
        time_text: Option<String>,
        text: String,
        reactions: Vec<Reaction>,
        attachments: Vec<Attachment>,
        reply_to: Option<ReplyContext>,
        edited: bool,
    },
}

/// The single "show older messages" control of a collapsed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandControl {
    gate: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStats {
    pub repaints: u64,
    pub loads: u64,
    pub stalls: u64,
    pub expansions: u64,
}

#[derive(Debug, Clone, Copy)]
enum Materialized {
    /// Rendered long before the scrape started.
    Settled,
    Since(Instant),
}

#[derive(Debug, Clone, Copy, Default)]
struct RenderFaults {
    text_delay_ms: u64,
    reaction_delay_ms: u64,
}

pub struct ScriptedView {
    conversation: Conversation,
    config: ViewConfig,
    rng: DeterministicRng,
    faults: Vec<RenderFaults>,
    stuck: HashSet<usize>,
    loaded_from: usize,
    gate: Option<usize>,
    position: ScrollPosition,
    load_requested: bool,
    materialized: HashMap<usize, Materialized>,
    stats: ViewStats,
}

impl ScriptedView {
    #[must_use]
    pub fn new(conversation: Conversation, config: ViewConfig, seed: u64) -> Self {
        let mut rng = DeterministicRng::fork(seed, 1);
        let len = conversation.len();
        let window = config.window.max(1);

        let mut faults = Vec::with_capacity(len);
        let mut stuck = HashSet::new();
        for (index, item) in conversation.items.iter().enumerate() {
            let mut fault = RenderFaults::default();
            if let SimItem::Message(message) = item {
                if rng.hit_rate_percent(config.slow_render_percent) {
                    fault.text_delay_ms =
                        rng.range_inclusive(config.min_render_delay_ms, config.max_render_delay_ms);
                }
                if !message.reactions.is_empty() && rng.hit_rate_percent(config.late_reaction_percent)
                {
                    fault.reaction_delay_ms = rng.range_inclusive(1, config.max_reaction_delay_ms);
                }
                if rng.hit_rate_percent(config.stuck_placeholder_percent) {
                    stuck.insert(index);
                }
            }
            faults.push(fault);
        }

        let loaded_from = len.saturating_sub(window);
        let gate = if config.collapsed_history && len > window * 3 {
            Some(len / 3).filter(|g| *g > 0 && *g < loaded_from)
        } else {
            None
        };
        let initial = if config.prerendered {
            Materialized::Settled
        } else {
            Materialized::Since(Instant::now())
        };
        let materialized = (loaded_from..len).map(|i| (i, initial)).collect();

        Self {
            conversation,
            config,
            rng,
            faults,
            stuck,
            loaded_from,
            gate,
            position: ScrollPosition::Newest,
            load_requested: false,
            materialized,
            stats: ViewStats::default(),
        }
    }

    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub const fn stats(&self) -> ViewStats {
        self.stats
    }

    /// Ids of messages that will never finish rendering.
    #[must_use]
    pub fn stuck_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .stuck
            .iter()
            .filter_map(|i| self.conversation.items.get(*i))
            .filter_map(|item| item.identity().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    fn floor(&self) -> usize {
        self.gate.unwrap_or(0)
    }

    fn window_range(&self) -> Range<usize> {
        let len = self.conversation.len();
        let window = self.config.window.max(1);
        match self.position {
            ScrollPosition::Newest => len.saturating_sub(window).max(self.loaded_from)..len,
            ScrollPosition::Oldest => self.loaded_from..(self.loaded_from + window).min(len),
        }
    }

    fn load_older(&mut self) {
        let floor = self.floor();
        if self.loaded_from <= floor {
            return;
        }
        if self.rng.hit_rate_percent(self.config.stall_percent) {
            self.stats.stalls += 1;
            return;
        }
        self.loaded_from = self
            .loaded_from
            .saturating_sub(self.config.page.max(1))
            .max(floor);
        self.stats.loads += 1;
    }

    fn refresh_materialized(&mut self, recreate: bool) {
        let window = self.window_range();
        if recreate {
            self.materialized.clear();
        } else {
            self.materialized.retain(|i, _| window.contains(i));
        }
        let now = Instant::now();
        for i in window {
            self.materialized
                .entry(i)
                .or_insert(Materialized::Since(now));
        }
    }

    fn elapsed_ms(&self, index: usize) -> u64 {
        match self.materialized.get(&index) {
            Some(Materialized::Settled) => u64::MAX,
            Some(Materialized::Since(at)) => {
                u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX)
            }
            None => 0,
        }
    }

    fn render(&self, index: usize) -> Option<SimNode> {
        let item = self.conversation.items.get(index)?;
        let rendered = match item {
            SimItem::Separator { label, .. } => Rendered::Separator {
                label: label.clone(),
            },
            SimItem::Notice { id, text, .. } => Rendered::Notice {
                id: id.clone(),
                text: text.clone(),
            },
            SimItem::Message(message) => {
                let elapsed = self.elapsed_ms(index);
                let fault = self.faults.get(index).copied().unwrap_or_default();
                let text = if self.stuck.contains(&index) || elapsed < fault.text_delay_ms {
                    PLACEHOLDER_TEXT.to_string()
                } else {
                    message.text.clone()
                };
                let reactions = if elapsed < fault.reaction_delay_ms {
                    Vec::new()
                } else {
                    message.reactions.clone()
                };
                Rendered::Message {
                    id: message.id.clone(),
                    author_label: message.author_shown.then(|| message.author.clone()),
                    time_text: message.time_text(),
                    text,
                    reactions,
                    attachments: message.attachments.clone(),
                    reply_to: message.reply_to.clone(),
                    edited: message.edited,
                }
            }
        };
        Some(SimNode { index, rendered })
    }

    fn item_height(item: &SimItem) -> u64 {
        match item {
            SimItem::Separator { .. } => 24,
            SimItem::Notice { .. } => 20,
            SimItem::Message(message) => {
                let mut h = 48;
                if !message.reactions.is_empty() {
                    h += 22;
                }
                if !message.attachments.is_empty() {
                    h += 36;
                }
                h
            }
        }
    }
}

#[async_trait]
impl ConversationView for ScriptedView {
    type Node = SimNode;
    type Control = ExpandControl;

    async fn locate_container(&mut self) -> Result<(), ViewError> {
        if self.config.missing_container {
            return Err(ViewError::ContainerNotFound);
        }
        Ok(())
    }

    async fn scroll_to(&mut self, position: ScrollPosition) -> Result<(), ViewError> {
        self.position = position;
        if position == ScrollPosition::Oldest {
            self.load_requested = true;
        }
        Ok(())
    }

    async fn await_repaint(&mut self) {
        self.stats.repaints += 1;
        let scrolled = self.load_requested;
        if self.load_requested {
            self.load_requested = false;
            self.load_older();
        }
        self.refresh_materialized(scrolled && self.config.rerender_on_scroll);
        tokio::task::yield_now().await;
    }

    async fn visible_items(&self) -> Result<Vec<VisibleItem<SimNode>>, ViewError> {
        Ok(self
            .window_range()
            .filter_map(|i| self.render(i))
            .map(|node| {
                let item = self.conversation.items.get(node.index);
                VisibleItem {
                    identity: item.and_then(SimItem::identity).map(str::to_string),
                    timestamp_hint: item
                        .and_then(SimItem::as_message)
                        .and_then(crate::conversation::SimMessage::time_text),
                    node,
                }
            })
            .collect())
    }

    async fn content_height(&self) -> Result<u64, ViewError> {
        Ok(self
            .conversation
            .items
            .get(self.loaded_from..)
            .unwrap_or_default()
            .iter()
            .map(Self::item_height)
            .sum())
    }

    async fn expand_controls(&self) -> Result<Vec<ExpandControl>, ViewError> {
        match self.gate {
            Some(gate) if self.position == ScrollPosition::Oldest && self.loaded_from == gate => {
                Ok(vec![ExpandControl { gate }])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn activate(&mut self, control: &ExpandControl) -> Result<(), ViewError> {
        if self.gate != Some(control.gate) {
            return Err(ViewError::ControlFailed("stale expand control".into()));
        }
        self.gate = None;
        self.stats.expansions += 1;
        Ok(())
    }

    async fn sentinel_visible(&self) -> Result<bool, ViewError> {
        Ok(self.position == ScrollPosition::Oldest && self.loaded_from == 0)
    }

    async fn find_item(&self, id: &str) -> Result<Option<SimNode>, ViewError> {
        Ok(self
            .window_range()
            .find(|i| {
                self.conversation
                    .items
                    .get(*i)
                    .and_then(SimItem::identity)
                    == Some(id)
            })
            .and_then(|i| self.render(i)))
    }

    async fn has_reaction_control(&self, node: &SimNode) -> bool {
        self.conversation
            .items
            .get(node.index)
            .and_then(SimItem::as_message)
            .is_some_and(|message| !message.reactions.is_empty())
    }
}
