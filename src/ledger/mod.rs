//! Durable record of which archives and media files each collection has.
//!
//! The ledger is a single JSON document keyed by collection:
//!
//! ```json
//! {
//!   "Signals and Systems": {
//!     "archives": ["01_1402-07-04_08-00.rar"],
//!     "media": ["01_1402-07-04_08-00.mp4"],
//!     "download_folder": "downloads/Signals and Systems",
//!     "extract_folder": "extracted/Signals and Systems"
//!   }
//! }
//! ```
//!
//! Older files used `rars` / `mp4s` for the sets, or stored a bare list of
//! media names per collection; both are accepted on load and rewritten in the
//! current shape on the next persist.
//!
//! Every mutation runs inside one async mutex, including the file write, so
//! concurrent tasks never lose each other's updates.

mod error;

pub use error::LedgerError;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::fs_util::atomic_write;

/// Default ledger filename.
pub const DEFAULT_LEDGER_FILE: &str = "downloaded.json";

/// Progress of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionLedgerEntry {
    /// Archive filenames fetched so far.
    #[serde(default, alias = "rars")]
    pub archives: BTreeSet<String>,
    /// Media filenames produced so far.
    #[serde(default, alias = "mp4s")]
    pub media: BTreeSet<String>,
    /// Where archives for this collection are stored.
    #[serde(default)]
    pub download_folder: String,
    /// Where media for this collection is stored.
    #[serde(default)]
    pub extract_folder: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Current(CollectionLedgerEntry),
    Legacy(Vec<String>),
}

impl From<StoredEntry> for CollectionLedgerEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Current(entry) => entry,
            StoredEntry::Legacy(media) => Self {
                media: media.into_iter().collect(),
                ..Self::default()
            },
        }
    }
}

/// Persistent per-collection progress.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CollectionLedgerEntry>>,
}

impl Ledger {
    /// Loads the ledger at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] if the file cannot be read and
    /// [`LedgerError::Corrupt`] if it is not a ledger document.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no ledger yet, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(LedgerError::read(path, e)),
        };

        if raw.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let stored: BTreeMap<String, StoredEntry> =
            serde_json::from_str(&raw).map_err(|e| LedgerError::corrupt(&path, e))?;
        let legacy = stored
            .values()
            .filter(|entry| matches!(entry, StoredEntry::Legacy(_)))
            .count();
        if legacy > 0 {
            info!(legacy, "upgrading legacy ledger entries");
        }
        let entries: BTreeMap<String, CollectionLedgerEntry> = stored
            .into_iter()
            .map(|(key, entry)| (key, entry.into()))
            .collect();
        debug!(collections = entries.len(), "ledger loaded");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the entry for `key`, creating it if needed.
    ///
    /// Empty folder fields (entries upgraded from the legacy shape) are filled
    /// in. The file is only written when something changed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Write`] if the change could not be persisted.
    pub async fn ensure(
        &self,
        key: &str,
        download_dir: &Path,
        extract_dir: &Path,
    ) -> Result<CollectionLedgerEntry, LedgerError> {
        let mut entries = self.entries.lock().await;
        let mut changed = false;
        let entry = entries.entry(key.to_string()).or_insert_with(|| {
            changed = true;
            CollectionLedgerEntry::default()
        });
        if entry.download_folder.is_empty() {
            entry.download_folder = download_dir.display().to_string();
            changed = true;
        }
        if entry.extract_folder.is_empty() {
            entry.extract_folder = extract_dir.display().to_string();
            changed = true;
        }
        let snapshot = entry.clone();

        if changed {
            debug!(collection = key, "ledger entry created");
            self.write_locked(&entries).await?;
        }
        Ok(snapshot)
    }

    /// Records that `name` was fetched for collection `key`.
    ///
    /// Returns whether the set grew.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Write`] if the change could not be persisted.
    pub async fn mark_archive_fetched(&self, key: &str, name: &str) -> Result<bool, LedgerError> {
        self.mark(key, name, |entry| &mut entry.archives).await
    }

    /// Records that `name` was produced for collection `key`.
    ///
    /// Returns whether the set grew.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Write`] if the change could not be persisted.
    pub async fn mark_media_produced(&self, key: &str, name: &str) -> Result<bool, LedgerError> {
        self.mark(key, name, |entry| &mut entry.media).await
    }

    async fn mark<F>(&self, key: &str, name: &str, set: F) -> Result<bool, LedgerError>
    where
        F: FnOnce(&mut CollectionLedgerEntry) -> &mut BTreeSet<String>,
    {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        if !set(entry).insert(name.to_string()) {
            return Ok(false);
        }
        debug!(collection = key, name, "ledger updated");
        self.write_locked(&entries).await?;
        Ok(true)
    }

    /// Writes the current state to disk.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Write`] if serialization or the write fails.
    pub async fn persist(&self) -> Result<(), LedgerError> {
        let entries = self.entries.lock().await;
        self.write_locked(&entries).await
    }

    async fn write_locked(
        &self,
        entries: &BTreeMap<String, CollectionLedgerEntry>,
    ) -> Result<(), LedgerError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| LedgerError::write(&self.path, std::io::Error::other(e)))?;
        if let Err(e) = atomic_write(&self.path, json).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "ledger write failed, keeping in-memory state"
            );
            return Err(LedgerError::write(&self.path, e));
        }
        Ok(())
    }

    /// Returns a copy of the entry for `key`.
    pub async fn entry(&self, key: &str) -> Option<CollectionLedgerEntry> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Returns true if media `name` is recorded for `key`.
    pub async fn is_media_produced(&self, key: &str, name: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|entry| entry.media.contains(name))
    }

    /// Returns true if archive `name` is recorded for `key`.
    pub async fn is_archive_fetched(&self, key: &str, name: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(key)
            .is_some_and(|entry| entry.archives.contains(name))
    }

    /// Returns a copy of every entry.
    pub async fn snapshot(&self) -> BTreeMap<String, CollectionLedgerEntry> {
        self.entries.lock().await.clone()
    }
}
