#![forbid(unsafe_code)]

mod cmd;
mod output;

use backscroll_core::error::{ConfigError, ErrorCode, ScrapeError};
use clap::{Parser, Subcommand};
use output::{OutputMode, resolve_output_mode};
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "backscroll: reconstruct complete transcripts from virtualized conversation views",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Simulation",
        about = "Scrape simulated conversations",
        long_about = "Drive the scrape engine against seeded, scripted virtualized views\n\
                      and check every transcript against ground truth.",
        after_help = "EXAMPLES:\n    # Run a 100-seed campaign\n    backscroll sim run --seeds 100\n\n\
                      # Replay one seed and print its transcript\n    backscroll sim replay --seed 7 --transcript"
    )]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Configuration",
        about = "Inspect engine configuration",
        long_about = "Show the effective engine config resolved from .backscroll/config.toml,\n\
                      the user config directory, and built-in defaults.",
        after_help = "EXAMPLES:\n    # Effective config\n    backscroll config show\n\n\
                      # Raw project file as JSON\n    backscroll config show --project --format json"
    )]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BACKSCROLL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "backscroll=debug,info"
        } else {
            "backscroll=info,warn"
        })
    });

    let format = env::var("BACKSCROLL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Error code carried anywhere in the chain, if any.
fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<ScrapeError>()
            .map(ScrapeError::code)
            .or_else(|| cause.downcast_ref::<ConfigError>().map(ConfigError::code))
    })
}

fn report_error(err: &anyhow::Error, output: OutputMode) {
    let code = error_code(err);
    if output.is_json() {
        let value = serde_json::json!({
            "error": format!("{err:#}"),
            "code": code.map(ErrorCode::code),
            "hint": code.and_then(ErrorCode::hint),
        });
        eprintln!("{value}");
        return;
    }
    match code {
        Some(code) => {
            eprintln!("error[{code}]: {}: {err:#}", code.message());
            if let Some(hint) = code.hint() {
                eprintln!("  hint: {hint}");
            }
        }
        None => eprintln!("error: {err:#}"),
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }
    let output = cli.output_mode();

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|project_root| match &cli.command {
            Commands::Sim(args) => cmd::sim::run_sim(args, output, &project_root),
            Commands::Config(args) => cmd::config::run_config(args, &project_root, output),
        });

    if let Err(err) = result {
        report_error(&err, output);
        std::process::exit(2);
    }
}
