//! Binary entry point for alertdedup.
//!
//! This binary provides the CLI interface for the alertdedup classifier.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use alertdedup::cli::{ConfigCommand, RunCommand, ScoreCommand};
use alertdedup::config::AppConfig;
use alertdedup::io::{DedupRunner, Format, RejectPolicy, RunProgress, RunSummary, STDIO_PATH};
use alertdedup::observability::{self, InitOptions};
use alertdedup::services::deduplication::{ResetPolicy, parse_duration};
use anyhow::Context;
use chrono::TimeDelta;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Exit status after Ctrl+C, as shells report SIGINT.
const EXIT_CANCELLED: u8 = 130;

/// Records between progress message updates.
const PROGRESS_EVERY: usize = 500;

/// Rejection messages echoed after a run.
const SHOWN_ERRORS: usize = 5;

/// alertdedup - Streaming near-duplicate detection for alert and log events.
#[derive(Parser)]
#[command(name = "alertdedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress progress and the run summary.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "ALERTDEDUP_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Classify every event of a file as novel or duplicate.
    Run(RunArgs),

    /// Print the similarity score (0-100) of two messages.
    Score {
        /// First message.
        a: String,

        /// Second message.
        b: String,

        /// Compare raw text, without lowercasing or stripping punctuation.
        #[arg(long)]
        raw: bool,
    },

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },
}

/// Arguments of the `run` command. Unset flags keep the configured value.
#[derive(Args)]
struct RunArgs {
    /// Event file (CSV or NDJSON/JSON array), or `-` for stdin.
    input: PathBuf,

    /// Classification output, or `-` for stdout.
    #[arg(short, long, default_value = STDIO_PATH)]
    output: PathBuf,

    /// Also write novel events to this file.
    #[arg(long)]
    novel_out: Option<PathBuf>,

    /// Input format: csv or json. Detected from the extension when omitted.
    #[arg(short, long)]
    format: Option<Format>,

    /// Output format: csv or json. Defaults to the input format.
    #[arg(long)]
    output_format: Option<Format>,

    /// Look-back horizon, e.g. `90s`, `30m`, `1h`.
    #[arg(long, value_parser = parse_duration)]
    horizon: Option<TimeDelta>,

    /// Minimum similarity (0-100) for a match.
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Qualifying matches needed to classify as duplicate.
    #[arg(long)]
    min_matches: Option<usize>,

    /// Keep an independent window per value of this column.
    #[arg(long)]
    partition_by: Option<String>,

    /// Column holding the event id.
    #[arg(long)]
    id_field: Option<String>,

    /// Column holding the timestamp.
    #[arg(long)]
    timestamp_field: Option<String>,

    /// Column holding the message.
    #[arg(long)]
    message_field: Option<String>,

    /// Sort the input by timestamp before classifying.
    #[arg(long)]
    sort: bool,

    /// Stop at the first rejected event instead of skipping it.
    #[arg(long)]
    fail_on_reject: bool,

    /// Score candidates in parallel.
    #[arg(long)]
    parallel: bool,

    /// Window reset policy: never or daily.
    #[arg(long)]
    reset_policy: Option<ResetPolicy>,
}

impl RunArgs {
    /// Layers the flags that were given on top of `config`.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(horizon) = self.horizon {
            config.dedup.window_horizon = horizon;
        }
        if let Some(threshold) = self.threshold {
            config.dedup.min_similarity_threshold = threshold;
        }
        if let Some(count) = self.min_matches {
            config.dedup.min_match_count = count;
        }
        if let Some(policy) = self.reset_policy {
            config.dedup.reset_policy = policy;
        }
        if self.parallel {
            config.dedup.parallel_scoring = true;
        }
        if self.sort {
            config.sort = true;
        }
        if self.fail_on_reject {
            config.on_rejected = RejectPolicy::Fail;
        }

        let fields = [
            (&self.partition_by, &mut config.input.partition_field),
            (&self.id_field, &mut config.input.id_field),
            (&self.timestamp_field, &mut config.input.timestamp_field),
            (&self.message_field, &mut config.input.message_field),
        ];
        for (flag, field) in fields {
            if let Some(value) = flag {
                *field = Some(value.clone());
            }
        }
    }
}

/// Main entry point.
fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Commands::Run(args) = &cli.command {
        args.apply(&mut config);
        if let Err(e) = config.dedup.validate() {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    }

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &AppConfig) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => cmd_run(args, config, cli.quiet),

        Commands::Score { a, b, raw } => {
            let score = ScoreCommand::new(a, b).raw(raw).execute();
            println!("{score}");
            Ok(ExitCode::SUCCESS)
        },

        Commands::Config { show } => {
            if show {
                print!("{}", ConfigCommand::new().show(config)?);
            } else {
                println!("Use --show to print the effective configuration");
            }
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Executes the run command.
fn cmd_run(args: RunArgs, config: &AppConfig, quiet: bool) -> anyhow::Result<ExitCode> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("failed to set Ctrl+C handler")?;

    let progress = progress_bar(quiet)?;
    let ticker = progress.clone();
    let runner = DedupRunner::new(config.run_options())
        .with_cancel_flag(cancel)
        .with_progress(Box::new(move |p: &RunProgress| {
            if progress_due(p) {
                ticker.set_message(progress_message(p));
            }
        }));

    let mut command = RunCommand::new(&args.input).with_output(&args.output);
    command.novel_out = args.novel_out;
    command.format = args.format;
    command.output_format = args.output_format;

    let result = command.execute(&runner, &config.input);
    progress.finish_and_clear();
    let summary = result.with_context(|| format!("run failed for {}", args.input.display()))?;

    if !quiet {
        print_summary(&summary);
    }

    if summary.cancelled {
        eprintln!("Cancelled; partial output was written");
        return Ok(ExitCode::from(EXIT_CANCELLED));
    }
    Ok(ExitCode::SUCCESS)
}

/// Builds a stderr spinner, hidden in quiet mode.
fn progress_bar(quiet: bool) -> anyhow::Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("invalid progress template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

const fn progress_due(p: &RunProgress) -> bool {
    p.read % PROGRESS_EVERY == 0
}

fn progress_message(p: &RunProgress) -> String {
    match p.percent_complete() {
        Some(percent) => format!(
            "{} read ({percent:.1}%), {} duplicates, {} rejected",
            p.read, p.duplicates, p.rejected
        ),
        None => format!(
            "{} read, {} duplicates, {} rejected",
            p.read, p.duplicates, p.rejected
        ),
    }
}

fn print_summary(summary: &RunSummary) {
    eprintln!(
        "Processed {} events: {} duplicates ({:.1}%), {} novel",
        summary.processed,
        summary.duplicates,
        summary.duplicate_ratio() * 100.0,
        summary.novel
    );
    eprintln!(
        "Partitions: {}, peak window: {}, evicted: {}, resets: {}",
        summary.partitions, summary.peak_window_len, summary.evicted, summary.resets
    );

    if summary.rejected() > 0 {
        eprintln!(
            "Rejected {} (out of order: {}, invalid: {}, scorer failures: {})",
            summary.rejected(),
            summary.rejected_out_of_order,
            summary.rejected_invalid,
            summary.scorer_failures
        );
        for error in summary.errors.iter().take(SHOWN_ERRORS) {
            eprintln!("  - {error}");
        }
        if summary.errors.len() > SHOWN_ERRORS {
            eprintln!("  ... and {} more", summary.rejected() - SHOWN_ERRORS as u64);
        }
    }
}
