//! Recording Harvester Core Library
//!
//! This library downloads archived class recordings listed on a course
//! page and extracts each archive into a single media file. Runs are
//! resumable and idempotent: a JSON ledger records every archive fetched and
//! every media file produced, and work already done is skipped.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`resolver`] - listing fragment parsing into deterministic recording names
//! - [`ledger`] - crash-safe per-collection progress file
//! - [`navigator`] - web navigation trait and the plain-HTTP backend
//! - [`fetch`] - fallback fetch strategies under a retry budget
//! - [`extract`] - idempotent archive-to-media extraction
//! - [`coordinator`] - bounded concurrent scheduling and run summaries
//! - [`config`] - run configuration and defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod coordinator;
pub mod extract;
pub mod fetch;
pub mod fs_util;
pub mod ledger;
pub mod navigator;
pub mod resolver;

// Re-export commonly used types
pub use config::{ConfigError, HarvestConfig};
pub use coordinator::{
    CollectionJob, Coordinator, CoordinatorError, FailureKind, ItemOutcome, ItemState, RunOutcome,
    RunSummary,
};
pub use extract::{CommandExtractor, ExtractionError, ExtractionStep, Extractor, MediaRef};
pub use fetch::{FetchChain, FetchOutcome, FetchPipeline, RetryPolicy, RetrySupervisor};
pub use ledger::{CollectionLedgerEntry, Ledger, LedgerError};
pub use navigator::{HttpNavigator, NavError, Navigator, Selector};
pub use resolver::{EntryResolver, ParseError, RecordingRef};
