//! Seed campaigns: generate, scrape, check, repeat.
//!
//! Every seed runs on its own paused tokio clock, so dwell delays and render
//! latencies cost no wall time and a failing seed replays identically.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use backscroll_core::config::{CalendarConfig, EngineConfig, ScrapeOptions};
use backscroll_core::engine::{ScrapeOutcome, Scraper};
use backscroll_core::status::{NullStatus, StatusSink};
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, ConversationConfig, generate_conversation};
use crate::extractor::SimExtractor;
use crate::oracle::{OracleResult, TranscriptOracle};
use crate::view::{ScriptedView, ViewConfig, ViewStats};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub seed_range: Range<u64>,
    pub conversation: ConversationConfig,
    pub view: ViewConfig,
    pub options: ScrapeOptions,
    pub engine: EngineConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..50,
            conversation: ConversationConfig::default(),
            view: ViewConfig::default(),
            options: ScrapeOptions::default(),
            engine: EngineConfig {
                calendar: CalendarConfig {
                    utc_offset_minutes: Some(0),
                },
                ..EngineConfig::default()
            },
        }
    }
}

impl CampaignConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.view.window == 0 || self.view.page == 0 {
            bail!("view window and page must be > 0");
        }
        if self.view.page > self.view.window {
            bail!(
                "view page ({}) must not exceed window ({})",
                self.view.page,
                self.view.window
            );
        }
        self.engine.validate().context("engine config")?;
        Ok(())
    }
}

/// Everything one simulated scrape produced.
#[derive(Debug, Clone)]
pub struct SeedRun {
    pub seed: u64,
    pub conversation: Conversation,
    pub outcome: ScrapeOutcome,
    pub oracle: OracleResult,
    pub view_stats: ViewStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// How often each stop signal ended the scroll.
    pub stop_reasons: BTreeMap<String, usize>,
    /// Seeds whose run had to expand collapsed history.
    pub expansions_exercised: usize,
    /// Seeds that finished with the empty-result status.
    pub empty_outcomes: usize,
    /// Entries reported incomplete after hydration, across all seeds.
    pub hydration_exhausted: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Current-thread runtime with a paused clock.
///
/// # Errors
///
/// Fails if the runtime cannot be built.
pub fn virtual_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .context("building simulation runtime")
}

/// Scrape one seed on the caller's runtime.
///
/// # Errors
///
/// Fails when the engine reports an environment or config error.
pub async fn scrape_seed(seed: u64, config: &CampaignConfig) -> Result<SeedRun> {
    scrape_seed_with_status(seed, config, Arc::new(NullStatus)).await
}

/// Scrape one seed, reporting progress to `status`.
///
/// # Errors
///
/// Fails when the engine reports an environment or config error.
pub async fn scrape_seed_with_status(
    seed: u64,
    config: &CampaignConfig,
    status: Arc<dyn StatusSink>,
) -> Result<SeedRun> {
    let conversation = generate_conversation(seed, &config.conversation);
    let view = ScriptedView::new(conversation.clone(), config.view.clone(), seed);
    let mut scraper =
        Scraper::new(view, SimExtractor::new(), config.engine.clone()).with_status(status);

    let outcome = scraper
        .run(&config.options)
        .await
        .with_context(|| format!("scraping seed {seed}"))?;
    let oracle = TranscriptOracle::new(
        &conversation,
        &config.options,
        config.engine.calendar.zone(),
    )
    .check_all(&outcome);

    tracing::debug!(
        seed,
        items = conversation.len(),
        passed = oracle.passed,
        stop_reason = outcome.report().scroll.stop_reason.as_str(),
        "seed scraped"
    );

    Ok(SeedRun {
        seed,
        conversation,
        view_stats: scraper.view().stats(),
        outcome,
        oracle,
    })
}

/// Replay a single seed for debugging.
///
/// # Errors
///
/// Returns an error when config validation or the scrape fails.
pub fn replay_seed(
    seed: u64,
    config: &CampaignConfig,
    status: Arc<dyn StatusSink>,
) -> Result<SeedRun> {
    config.validate()?;
    virtual_runtime()?.block_on(scrape_seed_with_status(seed, config, status))
}

/// Run every seed in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a scrape hits an
/// environment error.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;
    let runtime = virtual_runtime()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        stop_reasons: BTreeMap::new(),
        expansions_exercised: 0,
        empty_outcomes: 0,
        hydration_exhausted: 0,
    };

    for seed in config.seed_range.clone() {
        let run = runtime.block_on(scrape_seed(seed, config))?;
        report.seeds_run += 1;

        let scrape = run.outcome.report();
        *report
            .stop_reasons
            .entry(scrape.scroll.stop_reason.as_str().to_string())
            .or_default() += 1;
        if scrape.scroll.expansions > 0 {
            report.expansions_exercised += 1;
        }
        report.hydration_exhausted += scrape.hydration.exhausted.len();
        if matches!(run.outcome, ScrapeOutcome::Empty(_)) {
            report.empty_outcomes += 1;
        }

        if run.oracle.passed {
            report.seeds_passed += 1;
        } else {
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: run.oracle.violations.iter().map(ToString::to_string).collect(),
            });
        }
    }

    tracing::info!(
        seeds_run = report.seeds_run,
        seeds_passed = report.seeds_passed,
        first_failure = ?report.first_failure,
        "campaign finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_seed_range_is_rejected() {
        let config = CampaignConfig {
            seed_range: 3..3,
            ..CampaignConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn page_larger_than_window_is_rejected() {
        let mut config = CampaignConfig::default();
        config.view.page = config.view.window + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn small_campaign_passes() {
        let config = CampaignConfig {
            seed_range: 0..8,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign");
        assert_eq!(report.seeds_run, 8);
        assert!(report.all_passed(), "{:?}", report.failures);
        assert_eq!(report.stop_reasons.values().sum::<usize>(), 8);
    }

    #[test]
    fn replay_is_deterministic() {
        let config = CampaignConfig::default();
        let a = replay_seed(17, &config, Arc::new(NullStatus)).expect("replay");
        let b = replay_seed(17, &config, Arc::new(NullStatus)).expect("replay");
        assert_eq!(a.conversation, b.conversation);
        assert_eq!(a.outcome, b.outcome);
        assert_eq!(a.view_stats, b.view_stats);
    }
}
