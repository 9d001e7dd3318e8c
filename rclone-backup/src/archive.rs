//! Compression of a source directory into a timestamped `.tar.gz`.

use crate::config::BackupType;
use crate::utils::errors::{AgentError, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Sortable timestamp embedded in archive names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Prefix shared by every archive of one site and backup type.
pub fn name_prefix(site: &str, backup_type: BackupType) -> String {
    format!("{}_{}_backup", site, backup_type)
}

/// `{site}_{type}_backup_{YYYYMMDD-HHMMSS}`, without extension.
pub fn archive_name(site: &str, backup_type: BackupType, timestamp: NaiveDateTime) -> String {
    format!(
        "{}_{}",
        name_prefix(site, backup_type),
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Archive file in scratch space, removed when dropped.
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
}

impl ArchiveFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArchiveFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed local archive {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove local archive {}: {}", self.path.display(), e),
        }
    }
}

pub struct Archiver {
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl Archiver {
    pub fn new(scratch_dir: PathBuf, timeout: Duration) -> Self {
        Self { scratch_dir, timeout }
    }

    /// Compress `source` into `<scratch>/<archive_name>.tar.gz`.
    pub async fn compress(&self, source: &Path, archive_name: &str) -> Result<ArchiveFile> {
        if !source.is_dir() {
            return Err(AgentError::Compression(format!(
                "source '{}' is not a readable directory",
                source.display()
            )));
        }

        std::fs::create_dir_all(&self.scratch_dir)?;
        let archive = ArchiveFile {
            path: self
                .scratch_dir
                .join(format!("{}.{}", archive_name, ARCHIVE_EXTENSION)),
        };

        info!("Compressing {} to {}", source.display(), archive.path().display());

        let child = Command::new("tar")
            .arg("-czvf")
            .arg(archive.path())
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                AgentError::Compression(format!("tar timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| AgentError::Compression(format!("failed to spawn tar: {}", e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("tar: {}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Compression(format!(
                "tar exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(archive)
    }
}
