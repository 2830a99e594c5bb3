//! Capability interface over the live, virtualized conversation view.
//!
//! The engine never touches markup. Everything it needs from the view is
//! expressed here so it can run against a browser bridge or an in-memory
//! scripted fake alike.

use async_trait::async_trait;

use crate::error::ViewError;

/// Scroll extremities the driver commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollPosition {
    /// Bottom of the list, where the most recent items live.
    Newest,
    /// Top of the list; reaching it asks the view to load older history.
    Oldest,
}

/// One materialized item node in current rendering order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleItem<N> {
    pub node: N,
    /// Persistent identifier the view exposes for the node, if any.
    pub identity: Option<String>,
    /// Raw machine-readable timestamp attached to the node, if any.
    pub timestamp_hint: Option<String>,
}

#[async_trait]
pub trait ConversationView: Send + Sync {
    /// Handle to one rendered item. Handles may go stale between renders.
    type Node: Clone + Send + Sync;
    /// Handle to one "expand hidden history" control.
    type Control: Send + Sync;

    /// Confirm the scrollable container exists.
    ///
    /// # Errors
    ///
    /// [`ViewError::ContainerNotFound`] aborts the run.
    async fn locate_container(&mut self) -> Result<(), ViewError>;

    async fn scroll_to(&mut self, position: ScrollPosition) -> Result<(), ViewError>;

    /// Yield one rendering frame.
    async fn await_repaint(&mut self);

    /// Every currently materialized item, in rendering order (oldest first).
    async fn visible_items(&self) -> Result<Vec<VisibleItem<Self::Node>>, ViewError>;

    /// Total scrollable content size.
    async fn content_height(&self) -> Result<u64, ViewError>;

    /// Visible, enabled "expand hidden history" controls.
    async fn expand_controls(&self) -> Result<Vec<Self::Control>, ViewError>;

    /// # Errors
    ///
    /// Failures are logged by the driver and never abort the run.
    async fn activate(&mut self, control: &Self::Control) -> Result<(), ViewError>;

    /// True while the top-of-history sentinel is on screen.
    async fn sentinel_visible(&self) -> Result<bool, ViewError>;

    /// Re-resolve the current node for a stable identity.
    async fn find_item(&self, id: &str) -> Result<Option<Self::Node>, ViewError>;

    /// True when the node still shows a reaction control.
    async fn has_reaction_control(&self, node: &Self::Node) -> bool;
}
