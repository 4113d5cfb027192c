//! Fetch-then-extract for a single resolved recording.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, instrument, warn};

use crate::extract::{ExtractionError, ExtractionStep};
use crate::fetch::{FetchOutcome, FetchPipeline};
use crate::ledger::Ledger;
use crate::resolver::RecordingRef;
use super::state::{FailureKind, ItemOutcome, ItemProgress, ItemResult, ItemState};

/// Folders and key shared by every item of a collection.
#[derive(Debug, Clone)]
pub(crate) struct CollectionTarget {
    pub(crate) key: String,
    pub(crate) download_dir: std::path::PathBuf,
    pub(crate) extract_dir: std::path::PathBuf,
}

/// Everything an item task needs; cheap to clone into spawned tasks.
#[derive(Debug, Clone)]
pub(crate) struct ItemRunner {
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) fetcher: Arc<FetchPipeline>,
    pub(crate) extraction: ExtractionStep,
}

impl ItemRunner {
    /// Fetches (unless the archive is already recorded and present) and extracts.
    ///
    /// `fetch_permit` is released as soon as the archive is on disk.
    #[instrument(skip_all, fields(collection = %target.key, index = recording.index))]
    pub(crate) async fn run(
        &self,
        target: &CollectionTarget,
        recording: RecordingRef,
        mut progress: ItemProgress,
        fetch_permit: OwnedSemaphorePermit,
    ) -> ItemOutcome {
        let key = target.key.as_str();
        let archive_path = target.download_dir.join(&recording.archive_name);
        let mut outcome = ItemOutcome {
            collection: key.to_string(),
            index: recording.index,
            media_name: Some(recording.media_name.clone()),
            attempts: 0,
            result: ItemResult::Failed {
                kind: FailureKind::Transient,
                reason: String::new(),
            },
        };

        progress.advance(ItemState::Fetching);
        if self.archive_on_hand(key, &recording, &archive_path).await {
            debug!(archive = %archive_path.display(), "Archive already fetched, skipping download");
        } else {
            info!(archive = %recording.archive_name, "Downloading");
            let report = self.fetcher.fetch(&recording, &archive_path).await;
            outcome.attempts = report.attempts;
            match report.outcome {
                FetchOutcome::Success(_) => {
                    if let Err(e) = self
                        .ledger
                        .mark_archive_fetched(key, &recording.archive_name)
                        .await
                    {
                        warn!(error = %e, "Could not record fetched archive");
                    }
                }
                FetchOutcome::TerminalFailure(reason) => {
                    progress.advance(ItemState::Failed);
                    outcome.result = ItemResult::Failed {
                        kind: FailureKind::NotReady,
                        reason,
                    };
                    return outcome;
                }
                FetchOutcome::TransientFailure(reason) => {
                    progress.advance(ItemState::Failed);
                    outcome.result = ItemResult::Failed {
                        kind: FailureKind::Transient,
                        reason: format!("{reason} (after {} attempts)", report.attempts),
                    };
                    return outcome;
                }
            }
        }
        drop(fetch_permit);

        progress.advance(ItemState::Extracting);
        match self
            .extraction
            .ensure_extracted(&archive_path, &target.extract_dir)
            .await
        {
            Ok(media) => {
                if let Err(e) = self
                    .ledger
                    .mark_media_produced(key, &recording.media_name)
                    .await
                {
                    warn!(error = %e, "Could not record produced media");
                }
                progress.advance(ItemState::Done);
                outcome.result = ItemResult::Done {
                    media: media.path,
                    extracted: media.extracted,
                };
            }
            Err(error) => {
                progress.advance(ItemState::Failed);
                let kind = match error {
                    ExtractionError::NoMedia { .. } => FailureKind::NoMedia,
                    ExtractionError::Failed { .. } | ExtractionError::Io { .. } => {
                        FailureKind::Extraction
                    }
                };
                warn!(error = %error, "Extraction failed; archive kept for the next run");
                outcome.result = ItemResult::Failed {
                    kind,
                    reason: error.to_string(),
                };
            }
        }
        outcome
    }

    async fn archive_on_hand(&self, key: &str, recording: &RecordingRef, path: &Path) -> bool {
        self.ledger
            .is_archive_fetched(key, &recording.archive_name)
            .await
            && tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
