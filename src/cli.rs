//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use harvester_core::config::{
    DEFAULT_FETCH_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, DEFAULT_METADATA_CONCURRENCY,
    DEFAULT_PAGE_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT,
};
use harvester_core::ledger::DEFAULT_LEDGER_FILE;

/// Resumable batch download and extraction of class recordings.
///
/// Harvester fetches the archived recordings listed for each course, extracts
/// one media file per archive, and records progress so interrupted runs pick
/// up where they stopped.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download and extract every recording in a batch file
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Batch file (JSON) listing collections and their listing entries
    #[arg(long, value_name = "FILE")]
    pub batch: PathBuf,

    /// Progress ledger file
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LEDGER_FILE)]
    pub ledger: PathBuf,

    /// Root folder for archives of collections without an explicit folder
    #[arg(long, value_name = "DIR", default_value = "downloads")]
    pub downloads_dir: PathBuf,

    /// Root folder for media of collections without an explicit folder
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    pub extracted_dir: PathBuf,

    /// Maximum concurrent fetches (1-32)
    #[arg(short = 'c', long, default_value_t = DEFAULT_FETCH_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: u8,

    /// Maximum collections resolved at the same time (1-32)
    #[arg(long, default_value_t = DEFAULT_METADATA_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub metadata_concurrency: u8,

    /// Maximum fetch attempts per recording (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Page load timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_PAGE_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub page_timeout: u64,

    /// Timeout for a single archive transfer in seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TRANSFER_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..=86400))]
    pub transfer_timeout: u64,

    /// Reject entries with unknown month names instead of naming them month 00
    #[arg(long)]
    pub strict_months: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/harvester/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
