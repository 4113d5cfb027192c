//! Per-item lifecycle and outcome types.

use std::fmt;
use std::path::PathBuf;

use tracing::{trace, warn};

/// Lifecycle of one listing entry.
///
/// ```text
/// Pending -> Resolving -> Fetching -> Extracting -> Done
/// Pending -> Skipped          Resolving -> Skipped
/// any non-terminal state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Not started.
    Pending,
    /// Parsing the listing fragment.
    Resolving,
    /// Obtaining the archive.
    Fetching,
    /// Producing the media file.
    Extracting,
    /// Media file present and recorded.
    Done,
    /// Nothing to do.
    Skipped,
    /// Gave up on this item.
    Failed,
}

impl ItemState {
    /// Returns true for states an item never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Self::Failed)
                | (Self::Pending, Self::Resolving | Self::Skipped)
                | (Self::Resolving, Self::Fetching | Self::Skipped)
                | (Self::Fetching, Self::Extracting)
                | (Self::Extracting, Self::Done)
        )
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks one item through its lifecycle.
#[derive(Debug)]
pub(crate) struct ItemProgress {
    index: u32,
    state: ItemState,
}

impl ItemProgress {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            state: ItemState::Pending,
        }
    }

    pub(crate) fn state(&self) -> ItemState {
        self.state
    }

    /// Moves to `next`; an illegal move is logged and ignored.
    pub(crate) fn advance(&mut self, next: ItemState) {
        if self.state.can_transition_to(next) {
            trace!(index = self.index, from = %self.state, to = %next, "item state");
            self.state = next;
        } else {
            warn!(
                index = self.index,
                from = %self.state,
                to = %next,
                "ignoring illegal item transition"
            );
        }
    }
}

/// Why an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The server is still preparing the recording.
    NotReady,
    /// Fetch attempts were exhausted.
    Transient,
    /// The extractor failed.
    Extraction,
    /// The archive held no media file.
    NoMedia,
    /// The collection's folders could not be prepared.
    Setup,
    /// The item's task panicked.
    Panic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotReady => "not ready",
            Self::Transient => "fetch",
            Self::Extraction => "extraction",
            Self::NoMedia => "no media",
            Self::Setup => "setup",
            Self::Panic => "panic",
        };
        f.write_str(name)
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The ledger already records the media file.
    Recorded,
    /// The media file exists on disk; it has now been recorded.
    PresentOnDisk,
    /// The listing entry holds no recording that could be parsed.
    Unparseable,
}

impl SkipReason {
    /// Returns true if the item's media is already in place.
    #[must_use]
    pub fn is_complete(self) -> bool {
        !matches!(self, Self::Unparseable)
    }
}

/// How an item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemResult {
    /// The media file is in place.
    Done {
        /// Final media path.
        media: PathBuf,
        /// False if the media was already there when extraction ran.
        extracted: bool,
    },
    /// Nothing had to be done.
    Skipped(SkipReason),
    /// The item failed.
    Failed {
        /// Failure category.
        kind: FailureKind,
        /// Human-readable cause.
        reason: String,
    },
}

/// Final record for one listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    /// Collection key.
    pub collection: String,
    /// 1-based index within the collection.
    pub index: u32,
    /// Media filename, when the entry could be resolved.
    pub media_name: Option<String>,
    /// Fetch attempts made (0 when no fetch was needed).
    pub attempts: u32,
    /// How the item ended.
    pub result: ItemResult,
}

impl ItemOutcome {
    pub(crate) fn failed(
        collection: &str,
        index: u32,
        media_name: Option<String>,
        kind: FailureKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            index,
            media_name,
            attempts: 0,
            result: ItemResult::Failed {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub(crate) fn skipped(collection: &str, index: u32, reason: SkipReason) -> Self {
        Self {
            collection: collection.to_string(),
            index,
            media_name: None,
            attempts: 0,
            result: ItemResult::Skipped(reason),
        }
    }

    /// Returns true if the item's media is in place, produced now or before.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self.result {
            ItemResult::Done { .. } => true,
            ItemResult::Skipped(reason) => reason.is_complete(),
            ItemResult::Failed { .. } => false,
        }
    }

    /// Terminal state corresponding to the result.
    #[must_use]
    pub fn state(&self) -> ItemState {
        match self.result {
            ItemResult::Done { .. } => ItemState::Done,
            ItemResult::Skipped(_) => ItemState::Skipped,
            ItemResult::Failed { .. } => ItemState::Failed,
        }
    }

    /// The failure category, if the item failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.result {
            ItemResult::Failed { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
