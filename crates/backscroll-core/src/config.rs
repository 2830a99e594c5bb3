//! Engine tuning and per-run options.
//!
//! [`EngineConfig`] holds the empirically tuned thresholds (dwell times,
//! stagnation counts, hydration budget). They are configuration, not
//! semantics: nothing in the engine assumes particular values. Values load
//! from `.backscroll/config.toml` in the project root, then the user config
//! directory, then fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::Calendar;

// ---------------------------------------------------------------------------
// Run options
// ---------------------------------------------------------------------------

/// Options chosen by the caller for one scrape run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeOptions {
    /// Oldest timestamp (epoch ms, inclusive) the caller cares about.
    #[serde(default)]
    pub start_boundary: Option<i64>,
    /// Newest timestamp (epoch ms, inclusive) the caller cares about.
    #[serde(default)]
    pub end_boundary: Option<i64>,
    /// Keep system notices in the transcript.
    #[serde(default)]
    pub include_system_dividers: bool,
    #[serde(default = "default_true")]
    pub include_reactions: bool,
    #[serde(default = "default_true")]
    pub include_reply_context: bool,
    /// Insert one synthetic divider before each calendar day.
    #[serde(default = "default_true")]
    pub day_dividers: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            start_boundary: None,
            end_boundary: None,
            include_system_dividers: false,
            include_reactions: default_true(),
            include_reply_context: default_true(),
            day_dividers: default_true(),
        }
    }
}

impl ScrapeOptions {
    /// True when `ts_ms` lies within the caller's bounds (both inclusive).
    /// Unknown timestamps are always in range.
    #[must_use]
    pub fn in_bounds(&self, ts_ms: Option<i64>) -> bool {
        let Some(ts) = ts_ms else {
            return true;
        };
        if self.start_boundary.is_some_and(|start| ts < start) {
            return false;
        }
        if self.end_boundary.is_some_and(|end| ts > end) {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Engine tuning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scroll: ScrollConfig,
    #[serde(default)]
    pub hydration: HydrationConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scroll: ScrollConfig::default(),
            hydration: HydrationConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Settle time after the initial jump to the newest extremity.
    #[serde(default = "default_initial_settle_ms")]
    pub initial_settle_ms: u64,
    /// Dwell after each "reveal older history" command.
    #[serde(default = "default_base_dwell_ms")]
    pub base_dwell_ms: u64,
    /// Extra dwell added per `dwell_bucket_size` aggregated items.
    #[serde(default = "default_dwell_step_ms")]
    pub dwell_step_ms: u64,
    #[serde(default = "default_dwell_bucket_size")]
    pub dwell_bucket_size: usize,
    /// Cap on the adaptive part of the dwell.
    #[serde(default = "default_max_extra_dwell_ms")]
    pub max_extra_dwell_ms: u64,
    /// Stagnant passes required once the top sentinel has been seen.
    #[serde(default = "default_sentinel_stagnation")]
    pub sentinel_stagnation_passes: u32,
    /// Stagnant passes that stop the run even without the sentinel.
    #[serde(default = "default_hard_stagnation")]
    pub hard_stagnation_passes: u32,
    /// Emit a progress event every this many iterations.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u32,
    /// Pause after activating each expand-hidden-history control.
    #[serde(default = "default_expand_click_delay_ms")]
    pub expand_click_delay_ms: u64,
    /// Pause after re-asserting scroll position following an expansion.
    #[serde(default = "default_expand_settle_ms")]
    pub expand_settle_ms: u64,
    /// Extra pause before the next iteration after an expansion.
    #[serde(default = "default_expand_cooldown_ms")]
    pub expand_cooldown_ms: u64,
    /// Consecutive expansions without aggregate growth before expand
    /// controls are ignored and the pass counts toward stagnation.
    #[serde(default = "default_max_fruitless_expansions")]
    pub max_fruitless_expansions: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            initial_settle_ms: default_initial_settle_ms(),
            base_dwell_ms: default_base_dwell_ms(),
            dwell_step_ms: default_dwell_step_ms(),
            dwell_bucket_size: default_dwell_bucket_size(),
            max_extra_dwell_ms: default_max_extra_dwell_ms(),
            sentinel_stagnation_passes: default_sentinel_stagnation(),
            hard_stagnation_passes: default_hard_stagnation(),
            progress_interval: default_progress_interval(),
            expand_click_delay_ms: default_expand_click_delay_ms(),
            expand_settle_ms: default_expand_settle_ms(),
            expand_cooldown_ms: default_expand_cooldown_ms(),
            max_fruitless_expansions: default_max_fruitless_expansions(),
        }
    }
}

impl ScrollConfig {
    /// Dwell for the next iteration given the current aggregate size.
    ///
    /// Large histories render slower, so the dwell grows in steps.
    #[must_use]
    pub fn dwell_for(&self, aggregate_size: usize) -> Duration {
        let buckets = aggregate_size / self.dwell_bucket_size.max(1);
        let extra = u64::try_from(buckets)
            .unwrap_or(u64::MAX)
            .saturating_mul(self.dwell_step_ms)
            .min(self.max_extra_dwell_ms);
        Duration::from_millis(self.base_dwell_ms.saturating_add(extra))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrationConfig {
    #[serde(default = "default_hydration_attempts")]
    pub max_attempts: u32,
    /// Wait before the first retry.
    #[serde(default = "default_hydration_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Added to the wait for every further retry.
    #[serde(default = "default_hydration_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_hydration_attempts(),
            base_backoff_ms: default_hydration_base_backoff_ms(),
            backoff_step_ms: default_hydration_backoff_step_ms(),
        }
    }
}

impl HydrationConfig {
    /// Backoff before retry number `attempt` (zero-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_add(self.backoff_step_ms.saturating_mul(u64::from(attempt))),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CalendarConfig {
    /// Fixed UTC offset (minutes east) for day bucketing. Host local time
    /// when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl CalendarConfig {
    /// Calendar used to decide which day a timestamp falls on.
    #[must_use]
    pub fn zone(&self) -> Calendar {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .map_or(Calendar::Local, Calendar::Fixed)
    }

    /// Today's date in the configured calendar.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.zone().today()
    }
}

impl EngineConfig {
    /// Reject values that would make the engine loop forever or never wait.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scroll.sentinel_stagnation_passes == 0 {
            return Err(ConfigError::Invalid(
                "scroll.sentinel_stagnation_passes must be > 0".into(),
            ));
        }
        if self.scroll.hard_stagnation_passes < self.scroll.sentinel_stagnation_passes {
            return Err(ConfigError::Invalid(
                "scroll.hard_stagnation_passes must be >= sentinel_stagnation_passes".into(),
            ));
        }
        if self.scroll.progress_interval == 0 {
            return Err(ConfigError::Invalid(
                "scroll.progress_interval must be > 0".into(),
            ));
        }
        if self.scroll.max_fruitless_expansions == 0 {
            return Err(ConfigError::Invalid(
                "scroll.max_fruitless_expansions must be > 0".into(),
            ));
        }
        if self.scroll.dwell_bucket_size == 0 {
            return Err(ConfigError::Invalid(
                "scroll.dwell_bucket_size must be > 0".into(),
            ));
        }
        if let Some(minutes) = self.calendar.utc_offset_minutes {
            if FixedOffset::east_opt(minutes.saturating_mul(60)).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "calendar.utc_offset_minutes out of range: {minutes}"
                )));
            }
        }
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str::<EngineConfig>(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Path of the project-level config file.
#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".backscroll/config.toml")
}

/// Path of the user-level config file, if a config directory exists.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("backscroll/config.toml"))
}

/// Load the effective engine config for `project_root`.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be read, parsed or
/// validated.
pub fn load_engine_config(project_root: &Path) -> Result<EngineConfig, ConfigError> {
    let project = project_config_path(project_root);
    let config = if project.exists() {
        read_config(&project)?
    } else {
        match user_config_path() {
            Some(user) if user.exists() => read_config(&user)?,
            _ => EngineConfig::default(),
        }
    };
    config.validate()?;
    Ok(config)
}

const fn default_true() -> bool {
    true
}
const fn default_initial_settle_ms() -> u64 {
    300
}
const fn default_base_dwell_ms() -> u64 {
    700
}
const fn default_dwell_step_ms() -> u64 {
    200
}
const fn default_dwell_bucket_size() -> usize {
    500
}
const fn default_max_extra_dwell_ms() -> u64 {
    2000
}
const fn default_sentinel_stagnation() -> u32 {
    3
}
const fn default_hard_stagnation() -> u32 {
    25
}
const fn default_progress_interval() -> u32 {
    1
}
const fn default_expand_click_delay_ms() -> u64 {
    400
}
const fn default_expand_settle_ms() -> u64 {
    300
}
const fn default_expand_cooldown_ms() -> u64 {
    600
}
const fn default_max_fruitless_expansions() -> u32 {
    3
}
const fn default_hydration_attempts() -> u32 {
    3
}
const fn default_hydration_base_backoff_ms() -> u64 {
    450
}
const fn default_hydration_backoff_step_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dwell_grows_in_steps_and_caps() {
        let scroll = ScrollConfig::default();
        assert_eq!(scroll.dwell_for(0), Duration::from_millis(700));
        assert_eq!(scroll.dwell_for(499), Duration::from_millis(700));
        assert_eq!(scroll.dwell_for(500), Duration::from_millis(900));
        assert_eq!(scroll.dwell_for(1_000_000), Duration::from_millis(2700));
    }

    #[test]
    fn hydration_backoff_increases() {
        let hydration = HydrationConfig::default();
        assert_eq!(hydration.backoff(0), Duration::from_millis(450));
        assert_eq!(hydration.backoff(1), Duration::from_millis(650));
        assert!(hydration.backoff(2) > hydration.backoff(1));
    }

    #[test]
    fn bounds_are_inclusive_and_unknown_is_kept() {
        let opts = ScrapeOptions {
            start_boundary: Some(100),
            end_boundary: Some(200),
            ..ScrapeOptions::default()
        };
        assert!(opts.in_bounds(Some(100)));
        assert!(opts.in_bounds(Some(200)));
        assert!(!opts.in_bounds(Some(99)));
        assert!(!opts.in_bounds(Some(201)));
        assert!(opts.in_bounds(None));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            "[scroll]\nhard_stagnation_passes = 40\n\n[calendar]\nutc_offset_minutes = -300\n",
        )
        .expect("parse");
        assert_eq!(config.scroll.hard_stagnation_passes, 40);
        assert_eq!(config.scroll.base_dwell_ms, 700);
        assert_eq!(config.hydration.max_attempts, 3);
        assert_eq!(
            config.calendar.zone(),
            Calendar::Fixed(FixedOffset::west_opt(300 * 60).expect("offset"))
        );
        assert_eq!(CalendarConfig::default().zone(), Calendar::Local);
    }

    #[test]
    fn validate_rejects_zero_thresholds() {
        let mut config = EngineConfig::default();
        config.scroll.sentinel_stagnation_passes = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.scroll.hard_stagnation_passes = 1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.scroll.max_fruitless_expansions = 0;
        assert!(config.validate().is_err());

        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn project_config_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = project_config_path(dir.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[hydration]\nmax_attempts = 5\n").expect("write");

        let config = load_engine_config(dir.path()).expect("load");
        assert_eq!(config.hydration.max_attempts, 5);
    }

    #[test]
    fn malformed_project_config_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = project_config_path(dir.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[scroll\n").expect("write");

        let err = load_engine_config(dir.path()).expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
