use anyhow::{Context, Result, anyhow};
use backscroll_core::config::{
    EngineConfig, load_engine_config, project_config_path, user_config_path,
};
use clap::{Args, Subcommand};
use std::path::Path;
use toml::Value;

use crate::output::OutputMode;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show the effective engine config, or one raw config file
    Show(ShowArgs),
    /// Print where config files are looked up
    Path,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Path => run_path(project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let value = load_toml_table(&project_config_path(project_root))?;
        return print_toml_or_json(&value, output);
    }

    if args.user {
        let path = user_config_path().ok_or_else(|| anyhow!("no user config directory"))?;
        let value = load_toml_table(&path)?;
        return print_toml_or_json(&value, output);
    }

    let effective = load_engine_config(project_root)?;
    print_effective(&effective, output)
}

fn run_path(project_root: &Path, output: OutputMode) -> Result<()> {
    let project = project_config_path(project_root);
    let user = user_config_path();
    match output {
        OutputMode::Json => {
            let value = serde_json::json!({
                "project": project.display().to_string(),
                "project_exists": project.exists(),
                "user": user.as_ref().map(|p| p.display().to_string()),
                "user_exists": user.as_ref().is_some_and(|p| p.exists()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputMode::Text | OutputMode::Pretty => {
            println!("project={} exists={}", project.display(), project.exists());
            match user {
                Some(path) => println!("user={} exists={}", path.display(), path.exists()),
                None => println!("user=-"),
            }
        }
    }
    Ok(())
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_toml_or_json(value: &Value, output: OutputMode) -> Result<()> {
    match output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputMode::Text | OutputMode::Pretty => println!("{}", toml::to_string_pretty(value)?),
    }
    Ok(())
}

fn print_effective(config: &EngineConfig, output: OutputMode) -> Result<()> {
    match output {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputMode::Text => {
            let scroll = &config.scroll;
            println!("scroll.initial_settle_ms={}", scroll.initial_settle_ms);
            println!("scroll.base_dwell_ms={}", scroll.base_dwell_ms);
            println!("scroll.dwell_step_ms={}", scroll.dwell_step_ms);
            println!("scroll.dwell_bucket_size={}", scroll.dwell_bucket_size);
            println!("scroll.max_extra_dwell_ms={}", scroll.max_extra_dwell_ms);
            println!(
                "scroll.sentinel_stagnation_passes={}",
                scroll.sentinel_stagnation_passes
            );
            println!(
                "scroll.hard_stagnation_passes={}",
                scroll.hard_stagnation_passes
            );
            println!("scroll.progress_interval={}", scroll.progress_interval);
            println!("scroll.expand_click_delay_ms={}", scroll.expand_click_delay_ms);
            println!("scroll.expand_settle_ms={}", scroll.expand_settle_ms);
            println!("scroll.expand_cooldown_ms={}", scroll.expand_cooldown_ms);
            println!(
                "scroll.max_fruitless_expansions={}",
                scroll.max_fruitless_expansions
            );
            println!("hydration.max_attempts={}", config.hydration.max_attempts);
            println!(
                "hydration.base_backoff_ms={}",
                config.hydration.base_backoff_ms
            );
            println!(
                "hydration.backoff_step_ms={}",
                config.hydration.backoff_step_ms
            );
            match config.calendar.utc_offset_minutes {
                Some(minutes) => println!("calendar.utc_offset_minutes={minutes}"),
                None => println!("calendar.utc_offset_minutes=local"),
            }
        }
        OutputMode::Pretty => {
            println!("{}", toml::to_string_pretty(config)?);
        }
    }
    Ok(())
}
