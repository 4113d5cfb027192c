//! Error types for listing-entry resolution.

use thiserror::Error;

/// Reasons a listing fragment could not be turned into a recording.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The fragment has no link labelled as an offline recording.
    #[error("no offline link in entry #{index}")]
    NoOfflineLink {
        /// 1-based entry index.
        index: u32,
    },

    /// No parenthesized group with a month name and at least three parts.
    #[error("no date/time group in entry #{index} (groups: {groups:?})")]
    NoDateGroup {
        /// 1-based entry index.
        index: u32,
        /// Every parenthesized group that was inspected.
        groups: Vec<String>,
    },

    /// The date part did not match `day month year`.
    #[error("date parse failed in entry #{index}: '{date_part}'")]
    BadDate {
        /// 1-based entry index.
        index: u32,
        /// The date part as found.
        date_part: String,
    },

    /// The time part did not match `hour:minute period`.
    #[error("time parse failed in entry #{index}: '{time_part}'")]
    BadTime {
        /// 1-based entry index.
        index: u32,
        /// The time part as found.
        time_part: String,
    },

    /// Strict mode rejected an unrecognized month name.
    #[error("unknown month '{month}' in entry #{index}")]
    UnknownMonth {
        /// 1-based entry index.
        index: u32,
        /// The unrecognized month token.
        month: String,
    },

    /// The entry's link is a click target but no listing view is known.
    #[error("entry #{index} links to a page element but no listing view is set")]
    UnresolvableTrigger {
        /// 1-based entry index.
        index: u32,
    },
}

impl ParseError {
    /// Returns the entry index the error refers to.
    #[must_use]
    pub fn index(&self) -> u32 {
        match self {
            Self::NoOfflineLink { index }
            | Self::NoDateGroup { index, .. }
            | Self::BadDate { index, .. }
            | Self::BadTime { index, .. }
            | Self::UnknownMonth { index, .. }
            | Self::UnresolvableTrigger { index } => *index,
        }
    }
}
