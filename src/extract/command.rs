//! Extraction by spawning external archive tools.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Extractor, ExtractorError};

/// An external archive tool and how to invoke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTool {
    /// 7-Zip: `7z x ARCHIVE -oDEST -y`.
    SevenZip(PathBuf),
    /// `unrar x -y ARCHIVE DEST`.
    Unrar(PathBuf),
}

impl ArchiveTool {
    fn program(&self) -> &Path {
        match self {
            Self::SevenZip(program) | Self::Unrar(program) => program,
        }
    }

    fn command(&self, archive: &Path, dest_dir: &Path) -> Command {
        let mut command = Command::new(self.program());
        match self {
            Self::SevenZip(_) => {
                let mut out_flag = std::ffi::OsString::from("-o");
                out_flag.push(dest_dir);
                command.arg("x").arg(archive).arg(out_flag).arg("-y");
            }
            Self::Unrar(_) => {
                command.arg("x").arg("-y").arg(archive).arg(dest_dir);
            }
        }
        command.kill_on_drop(true);
        command
    }
}

/// Runs archive tools in order until one succeeds.
///
/// Tools that cannot be spawned or exit non-zero are skipped. After a
/// successful run every file under the destination is reported.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    tools: Vec<ArchiveTool>,
}

impl Default for CommandExtractor {
    fn default() -> Self {
        Self::new(vec![
            ArchiveTool::SevenZip(PathBuf::from("7z")),
            ArchiveTool::Unrar(PathBuf::from("unrar")),
        ])
    }
}

impl CommandExtractor {
    /// Creates an extractor trying `tools` in order.
    #[must_use]
    pub fn new(tools: Vec<ArchiveTool>) -> Self {
        Self { tools }
    }

    /// The tools tried, in order.
    #[must_use]
    pub fn tools(&self) -> &[ArchiveTool] {
        &self.tools
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn extract(
        &self,
        archive: &Path,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractorError> {
        let mut failures = Vec::new();

        for tool in &self.tools {
            let program = tool.program().display().to_string();
            debug!(tool = %program, archive = %archive.display(), "Running archive tool");
            match tool.command(archive, dest_dir).output().await {
                Ok(output) if output.status.success() => {
                    return list_files(dest_dir)
                        .await
                        .map_err(|source| ExtractorError::Io { source });
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let detail = stderr.lines().last().unwrap_or("").trim().to_string();
                    warn!(
                        tool = %program,
                        status = %output.status,
                        detail = %detail,
                        "Archive tool failed"
                    );
                    failures.push(format!("{program}: {} {detail}", output.status));
                }
                Err(e) => {
                    debug!(tool = %program, error = %e, "Archive tool unavailable");
                    failures.push(format!("{program}: {e}"));
                }
            }
        }

        Err(ExtractorError::AllToolsFailed {
            archive: archive.to_path_buf(),
            attempts: failures,
        })
    }
}

/// Every regular file below `root`.
async fn list_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}
