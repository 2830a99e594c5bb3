//! `backscroll sim`: deterministic scrape simulations.
//!
//! `backscroll sim run` scrapes many seeded conversations and checks every
//! transcript. `backscroll sim replay` re-runs one seed and can print the
//! transcript it produced.

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use backscroll_core::config::load_engine_config;
use backscroll_core::engine::ScrapeOutcome;
use backscroll_core::status::{LogStatus, NullStatus, StatusSink};
use backscroll_sim::campaign::{CampaignConfig, replay_seed, run_campaign};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, write_transcript};

/// Top-level arguments for `backscroll sim`.
#[derive(Args, Debug)]
pub struct SimArgs {
    #[command(subcommand)]
    pub command: SimCommand,
}

#[derive(Subcommand, Debug)]
pub enum SimCommand {
    #[command(
        about = "Run a simulation campaign across multiple seeds",
        long_about = "Generate seeded conversations, scrape each one through a scripted\n\
                      virtualized view, and check the transcript against ground truth.\n\
                      Reports pass/fail per seed and the first failure for replay.",
        after_help = "EXAMPLES:\n    # Run 100 seeds with defaults\n    backscroll sim run --seeds 100\n\n\
                      # Harsher view: more stalls and slow renders\n    backscroll sim run --seeds 200 --stall 30 --slow-render 25\n\n\
                      # Machine-readable output\n    backscroll sim run --seeds 100 --format json"
    )]
    Run(SimRunArgs),

    #[command(
        about = "Replay a single seed",
        long_about = "Replay one seed to see its scrape report, oracle verdict and, with\n\
                      --transcript, the reconstructed transcript itself.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    backscroll sim replay --seed 42\n\n\
                      # Print the transcript too\n    backscroll sim replay --seed 42 --transcript\n\n\
                      # Follow progress as it happens\n    backscroll sim replay --seed 42 --progress\n\n\
                      # Machine-readable output\n    backscroll sim replay --seed 42 --format json"
    )]
    Replay(SimReplayArgs),
}

/// Knobs shared by `run` and `replay`.
#[derive(Args, Debug, Clone)]
pub struct SimKnobs {
    /// Days of history per conversation.
    #[arg(long, default_value = "6")]
    pub days: u32,

    /// Percent of load requests that stall for a pass.
    #[arg(long, default_value = "15")]
    pub stall: u8,

    /// Percent of messages that render a placeholder first.
    #[arg(long, default_value = "10")]
    pub slow_render: u8,

    /// Percent of messages that never finish rendering.
    #[arg(long, default_value = "0")]
    pub stuck: u8,

    /// Do not hide older history behind an expand control.
    #[arg(long)]
    pub no_collapse: bool,

    /// Re-create every node on each scroll command.
    #[arg(long)]
    pub rerender: bool,

    /// Keep system notices in transcripts.
    #[arg(long)]
    pub include_system: bool,

    /// Oldest message time to keep (epoch ms).
    #[arg(long)]
    pub start_boundary: Option<i64>,
}

#[derive(Args, Debug)]
pub struct SimRunArgs {
    /// Number of seeds to run.
    #[arg(long, default_value = "100")]
    pub seeds: u64,

    /// Starting seed value.
    #[arg(long, default_value = "0")]
    pub seed_start: u64,

    #[command(flatten)]
    pub knobs: SimKnobs,
}

#[derive(Args, Debug)]
pub struct SimReplayArgs {
    /// Seed to replay.
    #[arg(long)]
    pub seed: u64,

    /// Print the reconstructed transcript.
    #[arg(long)]
    pub transcript: bool,

    /// Log scroll, hydration and extraction progress to stderr.
    #[arg(long)]
    pub progress: bool,

    #[command(flatten)]
    pub knobs: SimKnobs,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    seeds_run: usize,
    seeds_passed: usize,
    seeds_failed: usize,
    first_failure: Option<u64>,
    all_passed: bool,
    stop_reasons: std::collections::BTreeMap<String, usize>,
    expansions_exercised: usize,
    empty_outcomes: usize,
    hydration_exhausted: usize,
    failures: Vec<FailureOutput>,
}

#[derive(Debug, Serialize)]
struct FailureOutput {
    seed: u64,
    violations: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput {
    seed: u64,
    status: &'static str,
    items: usize,
    messages: usize,
    iterations: u32,
    stop_reason: &'static str,
    expansions: u32,
    hydration_candidates: usize,
    hydration_repaired: usize,
    hydration_exhausted: Vec<String>,
    repaints: u64,
    loads: u64,
    stalls: u64,
    oracle_passed: bool,
    violations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<serde_json::Value>,
}

/// Build a campaign config from CLI knobs.
///
/// Scroll and hydration tuning come from the project's engine config so a
/// simulation exercises the same thresholds a real scrape would. Day
/// bucketing is pinned to UTC unless the config names an offset.
pub fn build_campaign_config(
    seed_start: u64,
    seeds: u64,
    knobs: &SimKnobs,
    project_root: &Path,
) -> Result<CampaignConfig> {
    let mut config = CampaignConfig::default();
    config.seed_range = seed_start..seed_start.saturating_add(seeds);

    let engine = load_engine_config(project_root).context("loading engine config")?;
    config.engine.scroll = engine.scroll;
    config.engine.hydration = engine.hydration;
    if engine.calendar.utc_offset_minutes.is_some() {
        config.engine.calendar = engine.calendar;
    }

    config.conversation.days = knobs.days;
    config.view.stall_percent = knobs.stall.min(100);
    config.view.slow_render_percent = knobs.slow_render.min(100);
    config.view.stuck_placeholder_percent = knobs.stuck.min(100);
    config.view.collapsed_history = !knobs.no_collapse;
    config.view.rerender_on_scroll = knobs.rerender;
    config.options.include_system_dividers = knobs.include_system;
    config.options.start_boundary = knobs.start_boundary;
    Ok(config)
}

/// Execute `backscroll sim run`.
pub fn run_sim_run(args: &SimRunArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = build_campaign_config(args.seed_start, args.seeds, &args.knobs, project_root)?;
    let report = run_campaign(&config)?;

    let out = RunOutput {
        seeds_run: report.seeds_run,
        seeds_passed: report.seeds_passed,
        seeds_failed: report.failures.len(),
        first_failure: report.first_failure,
        all_passed: report.all_passed(),
        stop_reasons: report.stop_reasons.clone(),
        expansions_exercised: report.expansions_exercised,
        empty_outcomes: report.empty_outcomes,
        hydration_exhausted: report.hydration_exhausted,
        failures: report
            .failures
            .iter()
            .map(|f| FailureOutput {
                seed: f.seed,
                violations: f.violations.clone(),
            })
            .collect(),
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "campaign seeds_run={} days={} stall_pct={} slow_render_pct={}",
                out.seeds_run, args.knobs.days, args.knobs.stall, args.knobs.slow_render
            );
            println!(
                "results passed={} failed={} expansions={} empty={} hydration_exhausted={} all_passed={}",
                out.seeds_passed,
                out.seeds_failed,
                out.expansions_exercised,
                out.empty_outcomes,
                out.hydration_exhausted,
                out.all_passed
            );
            for (reason, count) in &out.stop_reasons {
                println!("stop_reason {reason}={count}");
            }
            if !out.all_passed {
                for failure in out.failures.iter().take(5) {
                    println!(
                        "failure seed={} violations={}",
                        failure.seed,
                        failure.violations.len()
                    );
                }
                if out.failures.len() > 5 {
                    println!("failures_truncated count={}", out.failures.len() - 5);
                }
                println!("hint replay_seed={}", out.first_failure.unwrap_or(0));
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, "Simulation Campaign")?;
            pretty_kv(&mut w, "Seeds", out.seeds_run.to_string())?;
            pretty_kv(&mut w, "Days", args.knobs.days.to_string())?;
            pretty_kv(&mut w, "Stall rate", format!("{}%", args.knobs.stall))?;
            pretty_kv(&mut w, "Slow renders", format!("{}%", args.knobs.slow_render))?;
            pretty_kv(
                &mut w,
                "Results",
                format!("{} passed / {} failed", out.seeds_passed, out.seeds_failed),
            )?;
            let reasons: Vec<String> = out
                .stop_reasons
                .iter()
                .map(|(reason, count)| format!("{reason} {count}"))
                .collect();
            pretty_kv(&mut w, "Stops", reasons.join(", "))?;
            pretty_kv(&mut w, "Expansions", out.expansions_exercised.to_string())?;
            pretty_kv(&mut w, "Exhausted", out.hydration_exhausted.to_string())?;

            if out.all_passed {
                pretty_kv(&mut w, "Status", "all seeds passed")?;
            } else {
                pretty_kv(
                    &mut w,
                    "Status",
                    format!(
                        "{} failures (first at seed {})",
                        out.seeds_failed,
                        out.first_failure.unwrap_or(0)
                    ),
                )?;
                println!();
                pretty_section(&mut w, "Failure Samples")?;
                for failure in out.failures.iter().take(5) {
                    println!(
                        "seed {:<8} violations={}",
                        failure.seed,
                        failure.violations.len()
                    );
                    for violation in &failure.violations {
                        println!("  - {violation}");
                    }
                }
                if out.failures.len() > 5 {
                    println!("... and {} more failures", out.failures.len() - 5);
                }
                println!();
                pretty_kv(
                    &mut w,
                    "Replay",
                    format!(
                        "backscroll sim replay --seed {} --days {}",
                        out.first_failure.unwrap_or(0),
                        args.knobs.days
                    ),
                )?;
            }
        }
    }

    // Exit code 1 on any failure for CI integration
    if !report.all_passed() {
        process::exit(1);
    }

    Ok(())
}

/// Execute `backscroll sim replay`.
pub fn run_sim_replay(
    args: &SimReplayArgs,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let config = build_campaign_config(args.seed, 1, &args.knobs, project_root)?;
    let status: Arc<dyn StatusSink> = if args.progress {
        Arc::new(LogStatus)
    } else {
        Arc::new(NullStatus)
    };
    let run = replay_seed(args.seed, &config, status)?;
    let report = run.outcome.report();

    let out = ReplayOutput {
        seed: args.seed,
        status: match run.outcome {
            ScrapeOutcome::Completed(_) => "completed",
            ScrapeOutcome::Empty(_) => "empty",
        },
        items: run.conversation.len(),
        messages: report.message_count,
        iterations: report.scroll.iterations,
        stop_reason: report.scroll.stop_reason.as_str(),
        expansions: report.scroll.expansions,
        hydration_candidates: report.hydration.candidates,
        hydration_repaired: report.hydration.repaired,
        hydration_exhausted: report.hydration.exhausted.clone(),
        repaints: run.view_stats.repaints,
        loads: run.view_stats.loads,
        stalls: run.view_stats.stalls,
        oracle_passed: run.oracle.passed,
        violations: run.oracle.violations.iter().map(ToString::to_string).collect(),
        transcript: match (&run.outcome, args.transcript) {
            (ScrapeOutcome::Completed(transcript), true) => {
                Some(serde_json::to_value(&transcript.entries)?)
            }
            _ => None,
        },
    };

    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputMode::Text => {
            println!(
                "replay seed={} status={} items={} messages={}",
                out.seed, out.status, out.items, out.messages
            );
            println!(
                "scroll iterations={} stop_reason={} expansions={} repaints={} loads={} stalls={}",
                out.iterations, out.stop_reason, out.expansions, out.repaints, out.loads, out.stalls
            );
            println!(
                "hydration candidates={} repaired={} exhausted={}",
                out.hydration_candidates,
                out.hydration_repaired,
                out.hydration_exhausted.len()
            );
            println!("oracle passed={}", out.oracle_passed);
            for violation in &out.violations {
                println!("violation={violation}");
            }
            if let (ScrapeOutcome::Completed(transcript), true) = (&run.outcome, args.transcript) {
                write_transcript(&mut std::io::stdout().lock(), &transcript.entries)?;
            }
        }
        OutputMode::Pretty => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            pretty_section(&mut w, &format!("Replay Seed {}", out.seed))?;
            pretty_kv(&mut w, "Status", out.status)?;
            pretty_kv(&mut w, "Items", out.items.to_string())?;
            pretty_kv(&mut w, "Messages", out.messages.to_string())?;
            pretty_kv(&mut w, "Iterations", out.iterations.to_string())?;
            pretty_kv(&mut w, "Stop reason", out.stop_reason)?;
            pretty_kv(&mut w, "Expansions", out.expansions.to_string())?;
            pretty_kv(
                &mut w,
                "View",
                format!(
                    "{} repaints, {} loads, {} stalls",
                    out.repaints, out.loads, out.stalls
                ),
            )?;
            pretty_kv(
                &mut w,
                "Hydration",
                format!(
                    "{} candidates, {} repaired, {} exhausted",
                    out.hydration_candidates,
                    out.hydration_repaired,
                    out.hydration_exhausted.len()
                ),
            )?;
            pretty_kv(&mut w, "Oracle", out.oracle_passed.to_string())?;

            if !out.oracle_passed {
                println!();
                pretty_section(&mut w, "Invariant Violations")?;
                for violation in &out.violations {
                    println!("- {violation}");
                }
            }

            if let (ScrapeOutcome::Completed(transcript), true) = (&run.outcome, args.transcript) {
                println!();
                pretty_section(&mut w, "Transcript")?;
                write_transcript(&mut w, &transcript.entries)?;
            }
        }
    }

    if !run.oracle.passed {
        process::exit(1);
    }

    Ok(())
}

/// Dispatch `backscroll sim` subcommands.
pub fn run_sim(args: &SimArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    match &args.command {
        SimCommand::Run(run_args) => run_sim_run(run_args, output, project_root),
        SimCommand::Replay(replay_args) => run_sim_replay(replay_args, output, project_root),
    }
}
