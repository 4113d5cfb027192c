//! Idempotent archive-to-media extraction.
//!
//! [`ExtractionStep::ensure_extracted`] turns `NN_date_time.rar` into
//! `NN_date_time.mp4` in the destination folder. If the media file is already
//! there the extractor is not invoked. Otherwise the archive is unpacked into
//! a scratch directory inside the destination (same filesystem), the first
//! matching media file is renamed into place and the scratch directory is
//! removed, so the target only ever appears complete.

mod command;

pub use command::{ArchiveTool, CommandExtractor};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors reported by an [`Extractor`].
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// No archive tool could unpack the archive.
    #[error("could not extract {}: {}", archive.display(), attempts.join("; "))]
    AllToolsFailed {
        /// The archive.
        archive: PathBuf,
        /// One line per tool tried.
        attempts: Vec<String>,
    },

    /// Reading the unpacked files failed.
    #[error("IO error listing extracted files: {source}")]
    Io {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Unpacks archives.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Unpacks `archive` into `dest_dir`, returning the paths it produced.
    async fn extract(&self, archive: &Path, dest_dir: &Path)
    -> Result<Vec<PathBuf>, ExtractorError>;
}

/// Errors from [`ExtractionStep::ensure_extracted`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extractor failed.
    #[error("extraction of {} failed: {source}", archive.display())]
    Failed {
        /// The archive.
        archive: PathBuf,
        /// The extractor's error.
        #[source]
        source: ExtractorError,
    },

    /// The archive held no file with the media extension.
    #[error("no .{extension} file found in {}", archive.display())]
    NoMedia {
        /// The archive.
        archive: PathBuf,
        /// The media extension looked for.
        extension: String,
    },

    /// A filesystem operation failed.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A media file in its final location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Final path of the media file.
    pub path: PathBuf,
    /// False when the file already existed and nothing was extracted.
    pub extracted: bool,
}

/// Produces the media file for an archive at most once.
#[derive(Clone)]
pub struct ExtractionStep {
    extractor: Arc<dyn Extractor>,
    media_extension: String,
}

impl ExtractionStep {
    /// Creates a step producing files with `media_extension` (without the dot).
    #[must_use]
    pub fn new(extractor: Arc<dyn Extractor>, media_extension: impl Into<String>) -> Self {
        Self {
            extractor,
            media_extension: media_extension.into(),
        }
    }

    /// Where the media file for `archive` ends up in `dest_dir`.
    #[must_use]
    pub fn target_for(&self, archive: &Path, dest_dir: &Path) -> PathBuf {
        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        dest_dir.join(format!("{stem}.{}", self.media_extension))
    }

    /// Ensures the media file for `archive` exists in `dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::Failed`] if the extractor fails,
    /// [`ExtractionError::NoMedia`] if nothing with the media extension was
    /// unpacked, and [`ExtractionError::Io`] for filesystem failures.
    #[instrument(skip(self), fields(archive = %archive.display()))]
    pub async fn ensure_extracted(
        &self,
        archive: &Path,
        dest_dir: &Path,
    ) -> Result<MediaRef, ExtractionError> {
        let target = self.target_for(archive, dest_dir);
        if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| ExtractionError::io(&target, e))?
        {
            debug!(target = %target.display(), "Media already present");
            return Ok(MediaRef {
                path: target,
                extracted: false,
            });
        }

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| ExtractionError::io(dest_dir, e))?;
        let scratch = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(dest_dir)
            .map_err(|e| ExtractionError::io(dest_dir, e))?;

        let produced = self
            .extractor
            .extract(archive, scratch.path())
            .await
            .map_err(|source| ExtractionError::Failed {
                archive: archive.to_path_buf(),
                source,
            })?;

        let mut media: Vec<PathBuf> = produced
            .into_iter()
            .filter(|path| self.has_media_extension(path))
            .collect();
        media.sort();
        let Some(chosen) = media.first() else {
            return Err(ExtractionError::NoMedia {
                archive: archive.to_path_buf(),
                extension: self.media_extension.clone(),
            });
        };
        if media.len() > 1 {
            warn!(
                count = media.len(),
                chosen = %chosen.display(),
                "Archive holds several media files, using the first"
            );
        }

        tokio::fs::rename(chosen, &target)
            .await
            .map_err(|e| ExtractionError::io(&target, e))?;
        info!(target = %target.display(), "Media extracted");

        Ok(MediaRef {
            path: target,
            extracted: true,
        })
    }

    fn has_media_extension(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.media_extension))
    }
}

impl std::fmt::Debug for ExtractionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionStep")
            .field("media_extension", &self.media_extension)
            .finish_non_exhaustive()
    }
}
