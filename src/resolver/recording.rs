//! Identity of one remote recording.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::navigator::Selector;

/// Calendar timestamp reconstructed from listing text.
///
/// Derived, not authoritative: `month` is [`UNKNOWN_MONTH`](super::calendar::UNKNOWN_MONTH)
/// when the listing used a month name outside the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledAt {
    /// Solar Hijri year.
    pub year: u32,
    /// Month number, 1-12, or 0 when unrecognized.
    pub month: u32,
    /// Day of month.
    pub day: u32,
    /// Hour after period adjustment.
    pub hour: u32,
    /// Minute.
    pub minute: u32,
}

impl ScheduledAt {
    /// Formats as `YYYY-MM-DD_HH-mm`, the stem shared by archive and media names.
    #[must_use]
    pub fn stem(&self) -> String {
        format!(
            "{}-{:02}-{:02}_{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// A page element to click on a shared parent view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerRef {
    /// Key of the parent view (the listing page URL).
    pub view: String,
    /// How to locate the element on that view.
    pub selector: Selector,
}

/// Where the archive bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceAction {
    /// A page that can be loaded directly.
    Url(String),
    /// An element that opens a secondary view when clicked.
    Trigger(TriggerRef),
}

impl fmt::Display for SourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Trigger(trigger) => write!(f, "{} on {}", trigger.selector, trigger.view),
        }
    }
}

/// Canonical identity of one recording within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingRef {
    /// 1-based position within the collection.
    pub index: u32,
    /// When the recording was scheduled.
    pub scheduled_at: ScheduledAt,
    /// Where to fetch the archive from.
    pub source: SourceAction,
    /// Deterministic archive filename.
    pub archive_name: String,
    /// Deterministic media filename.
    pub media_name: String,
}

impl RecordingRef {
    /// Builds a recording, deriving both filenames from `index` and `scheduled_at`.
    #[must_use]
    pub fn new(
        index: u32,
        scheduled_at: ScheduledAt,
        source: SourceAction,
        archive_extension: &str,
        media_extension: &str,
    ) -> Self {
        let (archive_name, media_name) =
            recording_names(index, &scheduled_at, archive_extension, media_extension);
        Self {
            index,
            scheduled_at,
            source,
            archive_name,
            media_name,
        }
    }
}

/// Returns `(archive_name, media_name)` for a recording.
#[must_use]
pub fn recording_names(
    index: u32,
    scheduled_at: &ScheduledAt,
    archive_extension: &str,
    media_extension: &str,
) -> (String, String) {
    let stem = format!("{index:02}_{}", scheduled_at.stem());
    (
        format!("{stem}.{archive_extension}"),
        format!("{stem}.{media_extension}"),
    )
}
