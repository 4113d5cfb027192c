//! Runtime configuration shared by every pipeline component.
//!
//! [`HarvestConfig`] is built once (by the binary, or by tests) and handed to
//! each component at construction. Nothing in the library reads timeouts or
//! limits from ambient state.

use std::time::Duration;

use thiserror::Error;

use crate::navigator::Selector;

/// Default page-load timeout (3 minutes).
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(180);

/// Default timeout for a single archive transfer (1 hour).
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default number of fetches that may hold an open view at the same time.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Default number of collections resolved at the same time.
pub const DEFAULT_METADATA_CONCURRENCY: usize = 2;

/// Default maximum fetch attempts per recording.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between fetch attempts.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for either concurrency limit.
pub const MAX_CONCURRENCY: usize = 32;

/// Marker shown by the listing site while a recording is still being converted.
pub const DEFAULT_NOT_READY_MARKERS: [&str; 2] = ["در حال آماده سازی", "being prepared"];

/// Errors produced by [`HarvestConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A concurrency limit is outside `1..=MAX_CONCURRENCY`.
    #[error("invalid {field} value {value}: must be between 1 and {MAX_CONCURRENCY}")]
    InvalidConcurrency {
        /// Which limit was invalid.
        field: &'static str,
        /// The rejected value.
        value: usize,
    },

    /// A timeout was zero.
    #[error("invalid {field}: timeout must be greater than zero")]
    ZeroTimeout {
        /// Which timeout was invalid.
        field: &'static str,
    },

    /// An extension was empty or contained a path separator.
    #[error("invalid {field} '{value}'")]
    InvalidExtension {
        /// Which extension was invalid.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// No trigger candidates were configured.
    #[error("at least one download trigger candidate is required")]
    NoTriggerCandidates,
}

/// Configuration for a harvesting run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Timeout for navigation, element lookup and clicks.
    pub page_timeout: Duration,
    /// Timeout for a single transfer to complete.
    pub transfer_timeout: Duration,
    /// Global cap on in-flight fetches (each holds at most one open view chain).
    pub fetch_concurrency: usize,
    /// Cap on collections resolving listing entries at the same time.
    pub metadata_concurrency: usize,
    /// Maximum fetch attempts per recording, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_base_delay: Duration,
    /// Extension of produced media files, without the dot.
    pub media_extension: String,
    /// Extension of fetched archives, without the dot.
    pub archive_extension: String,
    /// Download trigger selectors, most specific first.
    pub trigger_candidates: Vec<Selector>,
    /// Page text that means "content is still being prepared".
    pub not_ready_markers: Vec<String>,
    /// Links to an alternate listing of the same recording.
    pub alternate_listing_selectors: Vec<Selector>,
    /// Accept unknown month names as month `00` instead of rejecting the entry.
    pub lenient_months: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            metadata_concurrency: DEFAULT_METADATA_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            media_extension: "mp4".to_string(),
            archive_extension: "rar".to_string(),
            trigger_candidates: default_trigger_candidates("mp4"),
            not_ready_markers: DEFAULT_NOT_READY_MARKERS
                .iter()
                .map(|marker| (*marker).to_string())
                .collect(),
            alternate_listing_selectors: vec![
                Selector::LinkText("لیست ضبط".to_string()),
                Selector::LinkText("recording list".to_string()),
            ],
            lenient_months: true,
        }
    }
}

/// Builds the default trigger candidates for a media extension.
///
/// Exact media links come first, generic "download" labels last.
#[must_use]
pub fn default_trigger_candidates(media_extension: &str) -> Vec<Selector> {
    vec![
        Selector::LinkText(media_extension.to_ascii_uppercase()),
        Selector::HrefSuffix(format!(".{media_extension}")),
        Selector::LinkText("دانلود".to_string()),
        Selector::LinkText("download".to_string()),
    ]
}

impl HarvestConfig {
    /// Checks limits, timeouts and extensions.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_concurrency("fetch_concurrency", self.fetch_concurrency)?;
        validate_concurrency("metadata_concurrency", self.metadata_concurrency)?;
        if self.page_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "page_timeout",
            });
        }
        if self.transfer_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "transfer_timeout",
            });
        }
        validate_extension("media_extension", &self.media_extension)?;
        validate_extension("archive_extension", &self.archive_extension)?;
        if self.trigger_candidates.is_empty() {
            return Err(ConfigError::NoTriggerCandidates);
        }
        Ok(())
    }
}

fn validate_concurrency(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if (1..=MAX_CONCURRENCY).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidConcurrency { field, value })
    }
}

fn validate_extension(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.contains(['/', '\\', '.']) {
        return Err(ConfigError::InvalidExtension {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
