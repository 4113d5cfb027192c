//! Aggregated run results.

use tracing::{info, warn};

use super::state::{FailureKind, ItemOutcome, ItemResult, ItemState};

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing failed.
    Success,
    /// Some items failed, others completed or were already done.
    Partial,
    /// Items failed and none completed.
    Failure,
}

/// Picks the run verdict from item counts.
///
/// `completed` includes items skipped because an earlier run produced their
/// media. Entries skipped as unparseable count as neither.
#[must_use]
pub fn determine_run_outcome(completed: usize, failed: usize) -> RunOutcome {
    if failed == 0 {
        RunOutcome::Success
    } else if completed > 0 {
        RunOutcome::Partial
    } else {
        RunOutcome::Failure
    }
}

/// Results for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    /// Collection key.
    pub key: String,
    /// Every item outcome, ordered by index.
    pub items: Vec<ItemOutcome>,
}

impl CollectionSummary {
    /// Builds a summary, ordering items by index.
    #[must_use]
    pub fn new(key: impl Into<String>, mut items: Vec<ItemOutcome>) -> Self {
        items.sort_by_key(|item| item.index);
        Self {
            key: key.into(),
            items,
        }
    }

    fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|item| item.state() == state).count()
    }

    /// Items with nothing to do.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(ItemState::Skipped)
    }

    /// Items whose media is now in place.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(ItemState::Done)
    }

    /// Items that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(ItemState::Failed)
    }

    /// Items whose media is in place, produced by this run or an earlier one.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.items.iter().filter(|item| item.is_complete()).count()
    }

    /// The failed items.
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items
            .iter()
            .filter(|item| item.state() == ItemState::Failed)
    }
}

/// Results for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Per-collection results, in job order.
    pub collections: Vec<CollectionSummary>,
}

impl RunSummary {
    /// Total skipped items.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.collections.iter().map(CollectionSummary::skipped).sum()
    }

    /// Total succeeded items.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.collections.iter().map(CollectionSummary::succeeded).sum()
    }

    /// Total failed items.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.collections.iter().map(CollectionSummary::failed).sum()
    }

    /// Total items whose media is in place.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.collections.iter().map(CollectionSummary::completed).sum()
    }

    /// Every failed item across collections.
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.collections.iter().flat_map(CollectionSummary::failures)
    }

    /// Verdict for the run.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        determine_run_outcome(self.completed(), self.failed())
    }

    /// Logs per-collection counts, each failure, and the totals.
    pub fn log(&self) {
        for collection in &self.collections {
            info!(
                collection = %collection.key,
                skipped = collection.skipped(),
                succeeded = collection.succeeded(),
                failed = collection.failed(),
                "Collection finished"
            );
        }
        for item in self.failures() {
            if let ItemResult::Failed { kind, reason } = &item.result {
                warn!(
                    collection = %item.collection,
                    index = item.index,
                    media = item.media_name.as_deref().unwrap_or("?"),
                    kind = %kind,
                    reason = %reason,
                    "Item failed"
                );
            }
        }
        if self
            .failures()
            .any(|item| item.failure_kind() == Some(FailureKind::NotReady))
        {
            info!("Some recordings are still being prepared; run again later to fetch them");
        }
        info!(
            skipped = self.skipped(),
            succeeded = self.succeeded(),
            failed = self.failed(),
            "Run complete"
        );
    }
}
