//! Run facade: scroll, hydrate, resolve.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregator;
use crate::config::{EngineConfig, ScrapeOptions};
use crate::context::OrderContext;
use crate::driver::{ScrollDriver, ScrollReport};
use crate::error::ScrapeError;
use crate::extract::ItemExtractor;
use crate::hydrate::{HydrationReport, Hydrator};
use crate::model::TranscriptEntry;
use crate::resolve::OrderResolver;
use crate::status::{NullStatus, ProgressEvent, StatusSink};
use crate::view::ConversationView;

/// Bookkeeping for one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeReport {
    pub scroll: ScrollReport,
    pub hydration: HydrationReport,
    /// Distinct entries captured before filtering.
    pub aggregate_size: usize,
    /// Messages in the final transcript.
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub entries: Vec<TranscriptEntry>,
    pub report: ScrapeReport,
}

impl Transcript {
    pub fn messages(&self) -> impl Iterator<Item = &crate::model::MessageRecord> {
        self.entries.iter().filter_map(TranscriptEntry::as_message)
    }
}

/// Result of a run that did not hit an environment failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScrapeOutcome {
    Completed(Transcript),
    /// Nothing survived extraction and filtering.
    Empty(ScrapeReport),
}

impl ScrapeOutcome {
    #[must_use]
    pub const fn report(&self) -> &ScrapeReport {
        match self {
            Self::Completed(transcript) => &transcript.report,
            Self::Empty(report) => report,
        }
    }

    #[must_use]
    pub fn into_transcript(self) -> Option<Transcript> {
        match self {
            Self::Completed(transcript) => Some(transcript),
            Self::Empty(_) => None,
        }
    }
}

/// Owns a view and an extractor and runs the full pipeline over them.
pub struct Scraper<V, X> {
    view: V,
    extractor: X,
    config: EngineConfig,
    status: Arc<dyn StatusSink>,
}

impl<V, X> Scraper<V, X>
where
    V: ConversationView,
    X: ItemExtractor<V::Node>,
{
    pub fn new(view: V, extractor: X, config: EngineConfig) -> Self {
        Self {
            view,
            extractor,
            config,
            status: Arc::new(NullStatus),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: Arc<dyn StatusSink>) -> Self {
        self.status = status;
        self
    }

    pub const fn view(&self) -> &V {
        &self.view
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scroll the whole reachable history, hydrate, and order it.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or an environment failure (container missing,
    /// view surface lost). Per-item extraction problems never fail a run.
    pub async fn run(&mut self, options: &ScrapeOptions) -> Result<ScrapeOutcome, ScrapeError> {
        self.config.validate()?;
        let calendar = self.config.calendar.zone();
        #[allow(clippy::cast_precision_loss)]
        let sequence_base = Utc::now().timestamp_millis() as f64;

        let mut ctx = OrderContext::new(sequence_base, calendar);
        let mut aggregator = Aggregator::new();

        let scroll = ScrollDriver::new(
            &mut self.view,
            &self.extractor,
            self.status.as_ref(),
            &self.config.scroll,
            options,
        )
        .run(&mut aggregator, &mut ctx)
        .await?;

        let hydration = Hydrator::new(
            &self.view,
            &self.extractor,
            options,
            &self.config.hydration,
            calendar,
            sequence_base,
        )
        .run(&mut aggregator)
        .await;
        self.status.emit(ProgressEvent::Hydrate {
            pending: hydration.candidates,
            repaired: hydration.repaired,
            exhausted: hydration.exhausted.len(),
        });

        let aggregate_size = aggregator.len();
        let resolver = OrderResolver::new(calendar, calendar.today());
        let entries = resolver.resolve(aggregator.into_entries(), options);
        let message_count = entries.iter().filter(|e| !e.is_day_divider()).count();
        self.status.emit(ProgressEvent::Extract {
            total_extracted: message_count,
        });

        let report = ScrapeReport {
            scroll,
            hydration,
            aggregate_size,
            message_count,
        };
        tracing::info!(
            aggregate_size,
            message_count,
            iterations = report.scroll.iterations,
            stop_reason = ?report.scroll.stop_reason,
            "scrape finished"
        );

        if message_count == 0 {
            return Ok(ScrapeOutcome::Empty(report));
        }
        Ok(ScrapeOutcome::Completed(Transcript { entries, report }))
    }
}
