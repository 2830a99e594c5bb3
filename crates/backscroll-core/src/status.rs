//! Best-effort progress reporting.
//!
//! Delivery is fire-and-forget: a sink that fails must swallow the failure.
//! The engine never waits on, or fails because of, a status event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    Scroll {
        iteration: u32,
        visible: usize,
        aggregate_size: usize,
        filtered_size: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        oldest_visible_timestamp: Option<String>,
    },
    Hydrate {
        pending: usize,
        repaired: usize,
        exhausted: usize,
    },
    Extract {
        total_extracted: usize,
    },
}

pub trait StatusSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Scroll {
                iteration,
                visible,
                aggregate_size,
                filtered_size,
                oldest_visible_timestamp,
            } => tracing::info!(
                iteration,
                visible,
                aggregate_size,
                filtered_size,
                oldest = oldest_visible_timestamp.as_deref().unwrap_or("-"),
                "scroll pass"
            ),
            ProgressEvent::Hydrate {
                pending,
                repaired,
                exhausted,
            } => tracing::info!(pending, repaired, exhausted, "hydration"),
            ProgressEvent::Extract { total_extracted } => {
                tracing::info!(total_extracted, "extraction complete");
            }
        }
    }
}

impl StatusSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        // Receiver gone means nobody is listening; that is fine.
        let _ = self.send(event);
    }
}
