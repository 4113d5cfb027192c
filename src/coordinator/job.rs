//! Collection jobs and folder naming.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Characters replaced with `_` in folder names.
const INVALID_FOLDER_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/'];

#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex is valid") // Static pattern, safe to panic
});

/// Makes a collection key usable as a folder name on common filesystems.
///
/// Replaces reserved characters with `_`, drops control characters and
/// collapses whitespace runs to one space.
#[must_use]
pub fn sanitize_folder_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if INVALID_FOLDER_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let collapsed = WHITESPACE_RUN.replace_all(replaced.trim(), " ").into_owned();
    if collapsed.is_empty() || collapsed == "." || collapsed == ".." {
        "_".to_string()
    } else {
        collapsed
    }
}

/// One collection (course) to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionJob {
    /// Ledger key.
    pub key: String,
    /// Where archives are stored.
    pub download_dir: PathBuf,
    /// Where media files are stored.
    pub extract_dir: PathBuf,
    /// Listing page the fragments came from.
    pub listing_url: Option<String>,
    /// Raw listing fragments, in listing order.
    pub fragments: Vec<String>,
}

impl CollectionJob {
    /// Creates a job with explicit folders.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        extract_dir: impl Into<PathBuf>,
        fragments: Vec<String>,
    ) -> Self {
        Self {
            key: key.into(),
            download_dir: download_dir.into(),
            extract_dir: extract_dir.into(),
            listing_url: None,
            fragments,
        }
    }

    /// Creates a job whose folders are `<root>/<sanitized key>`.
    #[must_use]
    pub fn under_roots(
        key: impl Into<String>,
        downloads_root: &Path,
        extracted_root: &Path,
        fragments: Vec<String>,
    ) -> Self {
        let key = key.into();
        let folder = sanitize_folder_name(&key);
        Self::new(
            key,
            downloads_root.join(&folder),
            extracted_root.join(&folder),
            fragments,
        )
    }

    /// Sets the listing page URL.
    #[must_use]
    pub fn with_listing_url(mut self, listing_url: impl Into<String>) -> Self {
        self.listing_url = Some(listing_url.into());
        self
    }
}
