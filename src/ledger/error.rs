//! Error types for the progress ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or persisting the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file exists but could not be read.
    #[error("failed to read ledger {path}: {source}")]
    Read {
        /// The ledger file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The ledger file is not a valid ledger document.
    #[error("ledger {path} is corrupt: {source}")]
    Corrupt {
        /// The ledger file.
        path: PathBuf,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing the ledger failed; the in-memory state is unaffected.
    #[error("failed to write ledger {path}: {source}")]
    Write {
        /// The ledger file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl LedgerError {
    /// Creates a read error.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a corruption error.
    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error leaves the run unable to continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Write { .. })
    }
}
