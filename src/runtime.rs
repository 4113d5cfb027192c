//! Wiring between the CLI, config file and the core library.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use harvester_core::{
    CommandExtractor, Coordinator, HarvestConfig, HttpNavigator, Ledger, RunOutcome,
};
use tracing::{debug, info, warn};

use crate::app_config::{FileConfig, load_file_config};
use crate::batch::load_batch;
use crate::cli::{Cli, Command, RunArgs};

/// Environment variable holding an optional `Cookie` header for the listing site.
pub(crate) const COOKIE_ENV: &str = "HARVESTER_COOKIE";

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Failure,
    Partial,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}

impl From<RunOutcome> for ProcessExit {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => Self::Success,
            RunOutcome::Partial => Self::Partial,
            RunOutcome::Failure => Self::Failure,
        }
    }
}

/// Which run flags were given explicitly on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) ledger: bool,
    pub(crate) downloads_dir: bool,
    pub(crate) extracted_dir: bool,
    pub(crate) concurrency: bool,
    pub(crate) metadata_concurrency: bool,
    pub(crate) max_attempts: bool,
    pub(crate) page_timeout: bool,
    pub(crate) transfer_timeout: bool,
    pub(crate) strict_months: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = matches
        .subcommand_matches("run")
        .map(sources_from_matches)
        .unwrap_or_default();
    (cli, sources)
}

fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        ledger: is_commandline_value(matches, "ledger"),
        downloads_dir: is_commandline_value(matches, "downloads_dir"),
        extracted_dir: is_commandline_value(matches, "extracted_dir"),
        concurrency: is_commandline_value(matches, "concurrency"),
        metadata_concurrency: is_commandline_value(matches, "metadata_concurrency"),
        max_attempts: is_commandline_value(matches, "max_attempts"),
        page_timeout: is_commandline_value(matches, "page_timeout"),
        transfer_timeout: is_commandline_value(matches, "transfer_timeout"),
        strict_months: is_commandline_value(matches, "strict_months"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills in values from the config file where the flag was not given.
pub(crate) fn apply_config_defaults(
    mut args: RunArgs,
    sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> RunArgs {
    let Some(file) = file_config else {
        return args;
    };
    if !sources.ledger
        && let Some(ledger) = &file.ledger
    {
        args.ledger = ledger.clone();
    }
    if !sources.downloads_dir
        && let Some(dir) = &file.downloads_dir
    {
        args.downloads_dir = dir.clone();
    }
    if !sources.extracted_dir
        && let Some(dir) = &file.extracted_dir
    {
        args.extracted_dir = dir.clone();
    }
    if !sources.concurrency
        && let Some(value) = file.concurrency
    {
        args.concurrency = value;
    }
    if !sources.metadata_concurrency
        && let Some(value) = file.metadata_concurrency
    {
        args.metadata_concurrency = value;
    }
    if !sources.max_attempts
        && let Some(value) = file.max_attempts
    {
        args.max_attempts = value;
    }
    if !sources.page_timeout
        && let Some(value) = file.page_timeout_secs
    {
        args.page_timeout = value;
    }
    if !sources.transfer_timeout
        && let Some(value) = file.transfer_timeout_secs
    {
        args.transfer_timeout = value;
    }
    if !sources.strict_months
        && let Some(value) = file.strict_months
    {
        args.strict_months = value;
    }
    args
}

pub(crate) fn resolve_default_log_level(args: &RunArgs) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// `RUST_LOG` wins unless `-v` or `-q` was given explicitly.
pub(crate) fn should_force_cli_log_level(sources: &CliValueSources) -> bool {
    sources.verbose || sources.quiet
}

pub(crate) fn no_color_requested(no_color_flag: bool) -> bool {
    let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    let dumb_terminal = std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false);
    no_color_flag || no_color_env || dumb_terminal
}

pub(crate) fn init_tracing(default_level: &str, force_cli_level: bool, no_color: bool) {
    let filter = if force_cli_level {
        tracing_subscriber::EnvFilter::new(default_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_env_filter(filter)
        .try_init();
}

pub(crate) fn build_harvest_config(args: &RunArgs) -> HarvestConfig {
    HarvestConfig {
        page_timeout: Duration::from_secs(args.page_timeout),
        transfer_timeout: Duration::from_secs(args.transfer_timeout),
        fetch_concurrency: usize::from(args.concurrency),
        metadata_concurrency: usize::from(args.metadata_concurrency),
        max_attempts: u32::from(args.max_attempts),
        lenient_months: !args.strict_months,
        ..HarvestConfig::default()
    }
}

fn build_navigator() -> Result<HttpNavigator> {
    match std::env::var(COOKIE_ENV) {
        Ok(cookie) if !cookie.trim().is_empty() => {
            debug!("Using session cookie from {COOKIE_ENV}");
            HttpNavigator::with_session_cookie(&cookie)
                .with_context(|| format!("Invalid {COOKIE_ENV} value"))
        }
        _ => HttpNavigator::new().context("Failed to create HTTP client"),
    }
}

pub(crate) async fn run_harvester() -> Result<ProcessExit> {
    let (cli, sources) = parse_cli_with_sources();
    let Command::Run(args) = cli.command;

    let file_config = load_file_config(args.config.as_deref())?;
    let args = apply_config_defaults(args, &sources, file_config.as_ref());

    init_tracing(
        resolve_default_log_level(&args),
        should_force_cli_log_level(&sources),
        no_color_requested(args.no_color),
    );
    debug!(?args, "CLI arguments resolved");
    info!("Harvester starting");

    run(&args).await
}

async fn run(args: &RunArgs) -> Result<ProcessExit> {
    let jobs = load_batch(&args.batch, &args.downloads_dir, &args.extracted_dir)?;
    if jobs.is_empty() {
        warn!(batch = %args.batch.display(), "Batch file lists no collections");
        return Ok(ProcessExit::Success);
    }

    ensure_parent_dir(&args.ledger)?;
    let ledger = Ledger::load(&args.ledger)
        .await
        .with_context(|| format!("Cannot use ledger '{}'", args.ledger.display()))?;

    let coordinator = Coordinator::new(
        build_harvest_config(args),
        Arc::new(build_navigator()?),
        Arc::new(CommandExtractor::default()),
        Arc::new(ledger),
    )?;

    info!(collections = jobs.len(), "Processing batch");
    let summary = coordinator.run(jobs).await?;
    Ok(summary.outcome().into())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}
