//! Runs collections and their recordings concurrently.
//!
//! # Concurrency Model
//!
//! - Each collection runs in its own spawned task. Resolving a collection's
//!   listing holds a permit from the metadata pool.
//! - Each recording that needs work runs in its own spawned task holding a
//!   permit from the fetch pool until its archive is on disk. The pools are
//!   separate so listing work never starves downloads.
//! - Clicks on one shared listing view are serialized by [`SharedViews`];
//!   different views proceed in parallel.
//! - A failing or panicking item is recorded in its [`ItemOutcome`]; sibling
//!   items and collections keep running.

mod item;
mod job;
mod state;
mod summary;

pub use job::{CollectionJob, sanitize_folder_name};
pub use state::{FailureKind, ItemOutcome, ItemResult, ItemState, SkipReason};
pub use summary::{CollectionSummary, RunOutcome, RunSummary, determine_run_outcome};

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, HarvestConfig};
use crate::extract::{ExtractionStep, Extractor};
use crate::fetch::{FetchPipeline, RetryPolicy};
use crate::ledger::Ledger;
use crate::navigator::{Navigator, SharedViews};
use crate::resolver::EntryResolver;
use item::{CollectionTarget, ItemRunner};
use state::ItemProgress;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A concurrency pool was closed while work was pending.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Schedules collections and recordings under the configured bounds.
#[derive(Debug)]
pub struct Coordinator {
    config: Arc<HarvestConfig>,
    ledger: Arc<Ledger>,
    views: Arc<SharedViews>,
    runner: ItemRunner,
    fetch_slots: Arc<Semaphore>,
    metadata_slots: Arc<Semaphore>,
}

impl Coordinator {
    /// Creates a coordinator.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: HarvestConfig,
        navigator: Arc<dyn Navigator>,
        extractor: Arc<dyn Extractor>,
        ledger: Arc<Ledger>,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let config = Arc::new(config);
        let views = Arc::new(SharedViews::new(
            Arc::clone(&navigator),
            config.page_timeout,
        ));
        let fetcher = FetchPipeline::new(navigator, Arc::clone(&views), Arc::clone(&config));
        let extraction = ExtractionStep::new(extractor, config.media_extension.clone());

        debug!(
            fetch_concurrency = config.fetch_concurrency,
            metadata_concurrency = config.metadata_concurrency,
            "Creating coordinator"
        );
        Ok(Self {
            fetch_slots: Arc::new(Semaphore::new(config.fetch_concurrency)),
            metadata_slots: Arc::new(Semaphore::new(config.metadata_concurrency)),
            runner: ItemRunner {
                ledger: Arc::clone(&ledger),
                fetcher: Arc::new(fetcher),
                extraction,
            },
            config,
            ledger,
            views,
        })
    }

    /// Replaces the retry policy derived from the configuration.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        let fetcher = FetchPipeline::new(
            Arc::clone(self.runner.fetcher.navigator()),
            Arc::clone(&self.views),
            Arc::clone(&self.config),
        )
        .with_policy(policy);
        self.runner.fetcher = Arc::new(fetcher);
        self
    }

    /// Runs every job and returns the aggregated outcome.
    ///
    /// Item failures never fail the run; they are reported in the summary.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::SemaphoreClosed`] if a concurrency pool is
    /// closed underneath the run.
    #[instrument(skip_all, fields(collections = jobs.len()))]
    pub async fn run(&self, jobs: Vec<CollectionJob>) -> Result<RunSummary, CoordinatorError> {
        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let key = job.key.clone();
            let collection = CollectionRun {
                config: Arc::clone(&self.config),
                ledger: Arc::clone(&self.ledger),
                runner: self.runner.clone(),
                fetch_slots: Arc::clone(&self.fetch_slots),
                metadata_slots: Arc::clone(&self.metadata_slots),
            };
            handles.push((key, tokio::spawn(collection.run(job))));
        }

        let mut summary = RunSummary::default();
        let mut fatal = None;
        for (key, handle) in handles {
            match handle.await {
                Ok(Ok(collection)) => summary.collections.push(collection),
                Ok(Err(e)) => fatal = Some(e),
                Err(e) => {
                    warn!(collection = %key, error = %e, "Collection task panicked");
                    let outcome =
                        ItemOutcome::failed(&key, 0, None, FailureKind::Panic, panic_reason(&e));
                    summary
                        .collections
                        .push(CollectionSummary::new(key.clone(), vec![outcome]));
                }
            }
        }

        self.views.close_all().await;
        if let Some(e) = fatal {
            return Err(e);
        }
        summary.log();
        Ok(summary)
    }
}

/// State moved into one collection's task.
struct CollectionRun {
    config: Arc<HarvestConfig>,
    ledger: Arc<Ledger>,
    runner: ItemRunner,
    fetch_slots: Arc<Semaphore>,
    metadata_slots: Arc<Semaphore>,
}

impl CollectionRun {
    #[instrument(skip_all, fields(collection = %job.key))]
    async fn run(self, job: CollectionJob) -> Result<CollectionSummary, CoordinatorError> {
        let metadata_permit = Arc::clone(&self.metadata_slots)
            .acquire_owned()
            .await
            .map_err(|_| CoordinatorError::SemaphoreClosed)?;

        let target = CollectionTarget {
            key: job.key.clone(),
            download_dir: job.download_dir.clone(),
            extract_dir: job.extract_dir.clone(),
        };

        if let Err(e) = self
            .ledger
            .ensure(&job.key, &job.download_dir, &job.extract_dir)
            .await
        {
            warn!(error = %e, "Could not record collection in ledger");
        }
        if let Err(reason) = prepare_dirs(&job).await {
            warn!(reason = %reason, "Could not prepare collection folders");
            let items = (1..=index_count(&job))
                .map(|index| {
                    ItemOutcome::failed(&job.key, index, None, FailureKind::Setup, &reason)
                })
                .collect();
            return Ok(CollectionSummary::new(job.key, items));
        }

        let resolver = EntryResolver::for_listing(job.listing_url.clone())
            .with_lenient_months(self.config.lenient_months)
            .with_extensions(
                self.config.archive_extension.clone(),
                self.config.media_extension.clone(),
            );

        let mut outcomes = Vec::new();
        let mut resolved = Vec::new();
        for (index, fragment) in (1..).zip(&job.fragments) {
            let mut progress = ItemProgress::new(index);
            progress.advance(ItemState::Resolving);
            match resolver.try_resolve(fragment, index) {
                Ok(recording) => resolved.push((recording, progress)),
                Err(e) => {
                    warn!(index, error = %e, "Skipping unparseable listing entry");
                    progress.advance(ItemState::Skipped);
                    outcomes.push(ItemOutcome::skipped(&job.key, index, SkipReason::Unparseable));
                }
            }
        }
        drop(metadata_permit);
        info!(
            entries = job.fragments.len(),
            resolved = resolved.len(),
            "Listing resolved"
        );

        let target = Arc::new(target);
        let mut handles = Vec::new();
        for (recording, mut progress) in resolved {
            if let Some(reason) = self.skip_reason(&target, &recording.media_name).await {
                progress.advance(ItemState::Skipped);
                debug!(media = %recording.media_name, ?reason, "Already extracted");
                outcomes.push(ItemOutcome {
                    collection: job.key.clone(),
                    index: recording.index,
                    media_name: Some(recording.media_name),
                    attempts: 0,
                    result: ItemResult::Skipped(reason),
                });
                continue;
            }

            let permit = Arc::clone(&self.fetch_slots)
                .acquire_owned()
                .await
                .map_err(|_| CoordinatorError::SemaphoreClosed)?;
            let runner = self.runner.clone();
            let task_target = Arc::clone(&target);
            let index = recording.index;
            let media_name = recording.media_name.clone();
            handles.push((
                index,
                media_name,
                tokio::spawn(async move {
                    runner.run(&task_target, recording, progress, permit).await
                }),
            ));
        }

        for (index, media_name, handle) in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(index, error = %e, "Item task panicked");
                    ItemOutcome::failed(
                        &job.key,
                        index,
                        Some(media_name),
                        FailureKind::Panic,
                        panic_reason(&e),
                    )
                }
            });
        }

        Ok(CollectionSummary::new(job.key, outcomes))
    }

    /// Why `media_name` needs no work, recording on-disk media found unrecorded.
    async fn skip_reason(&self, target: &CollectionTarget, media_name: &str) -> Option<SkipReason> {
        if self.ledger.is_media_produced(&target.key, media_name).await {
            return Some(SkipReason::Recorded);
        }
        let on_disk = target.extract_dir.join(media_name);
        if !tokio::fs::try_exists(&on_disk).await.unwrap_or(false) {
            return None;
        }
        if let Err(e) = self.ledger.mark_media_produced(&target.key, media_name).await {
            warn!(error = %e, "Could not record media found on disk");
        }
        Some(SkipReason::PresentOnDisk)
    }
}

fn index_count(job: &CollectionJob) -> u32 {
    u32::try_from(job.fragments.len()).unwrap_or(u32::MAX)
}

async fn prepare_dirs(job: &CollectionJob) -> Result<(), String> {
    for dir in [&job.download_dir, &job.extract_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("creating {}: {e}", dir.display()))?;
    }
    Ok(())
}

fn panic_reason(error: &JoinError) -> String {
    if error.is_panic() {
        format!("task panicked: {error}")
    } else {
        format!("task cancelled: {error}")
    }
}
