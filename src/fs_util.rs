//! Filesystem helpers for crash-safe file placement.
//!
//! Readers of a target path either see the previous file or the complete new
//! one, never a partially written file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Creates an empty temp file next to `path`, named `.{file_name}.XXXXXX`.
fn temp_file_for(path: &Path) -> std::io::Result<NamedTempFile> {
    let prefix = format!(
        ".{}.",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("tmp")
    );
    tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(parent_dir(path))
}

/// Writes `contents` to a temp file in the target directory, then renames it
/// over `path`.
///
/// On failure the temp file is removed and `path` is untouched.
///
/// # Errors
///
/// Returns the IO error from creating, writing or renaming the temp file.
pub async fn atomic_write(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    let temp_path: TempPath = temp_file_for(path)?.into_temp_path();
    tokio::fs::write(&temp_path, contents).await?;
    temp_path.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Moves `from` to `to`.
///
/// Uses a rename when both paths are on the same filesystem. Otherwise the
/// file is copied into a temp file beside `to`, renamed into place, and the
/// source is removed.
///
/// # Errors
///
/// Returns the IO error from the rename, copy or removal.
pub async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            let temp_path = temp_file_for(to)?.into_temp_path();
            tokio::fs::copy(from, &temp_path).await?;
            temp_path.persist(to).map_err(|e| e.error)?;
            tokio::fs::remove_file(from).await
        }
        Err(e) => Err(e),
    }
}
