//! Batch file loading.
//!
//! ```json
//! {
//!   "collections": [
//!     {
//!       "key": "Signals and Systems",
//!       "listing_url": "https://lms.example.edu/course/42/recordings",
//!       "fragments": ["<li>...</li>", "<li>...</li>"]
//!     }
//!   ]
//! }
//! ```
//!
//! `download_dir` / `extract_dir` may be given per collection; otherwise the
//! folders are `<root>/<sanitized key>` under the run's root folders.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use harvester_core::CollectionJob;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchFile {
    collections: Vec<BatchCollection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchCollection {
    key: String,
    #[serde(default)]
    download_dir: Option<PathBuf>,
    #[serde(default)]
    extract_dir: Option<PathBuf>,
    #[serde(default)]
    listing_url: Option<String>,
    #[serde(default)]
    fragments: Vec<String>,
}

/// Reads the batch file at `path` into jobs.
pub fn load_batch(
    path: &Path,
    downloads_root: &Path,
    extracted_root: &Path,
) -> Result<Vec<CollectionJob>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file '{}'", path.display()))?;
    parse_batch(&raw, downloads_root, extracted_root)
        .with_context(|| format!("Invalid batch file '{}'", path.display()))
}

fn parse_batch(
    raw: &str,
    downloads_root: &Path,
    extracted_root: &Path,
) -> Result<Vec<CollectionJob>> {
    let batch: BatchFile = serde_json::from_str(raw)?;
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(batch.collections.len());

    for collection in batch.collections {
        if collection.key.trim().is_empty() {
            bail!("collection key must not be empty");
        }
        if !seen.insert(collection.key.clone()) {
            bail!("duplicate collection key '{}'", collection.key);
        }

        let mut job = CollectionJob::under_roots(
            collection.key,
            downloads_root,
            extracted_root,
            collection.fragments,
        );
        if let Some(dir) = collection.download_dir {
            job.download_dir = dir;
        }
        if let Some(dir) = collection.extract_dir {
            job.extract_dir = dir;
        }
        if let Some(url) = collection.listing_url {
            job = job.with_listing_url(url);
        }
        jobs.push(job);
    }
    Ok(jobs)
}
