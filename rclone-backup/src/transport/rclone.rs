//! [`Transport`] backed by the rclone CLI.

use super::Transport;
use crate::utils::errors::{AgentError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// rclone exit code for "directory not found"
const EXIT_DIR_NOT_FOUND: i32 = 3;

pub struct Rclone {
    remote_name: String,
    log_file: PathBuf,
    timeout: Duration,
    program: PathBuf,
}

impl Rclone {
    pub fn new(remote_name: impl Into<String>, log_file: PathBuf, timeout: Duration) -> Self {
        Self {
            remote_name: remote_name.into(),
            log_file,
            timeout,
            program: PathBuf::from("rclone"),
        }
    }

    /// Use a specific rclone binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    async fn run<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("rclone timed out after {}s", self.timeout.as_secs()),
                )
            })?
    }
}

fn failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("rclone exited with {}: {}", output.status, stderr.trim())
}

/// True if `listremotes` output contains `name` as a configured remote.
fn has_remote(listing: &str, name: &str) -> bool {
    let wanted = format!("{}:", name);
    listing.lines().any(|line| line.trim() == wanted)
}

/// Keep `lsf` lines naming a file with the given prefix, preserving order.
fn filter_listing(stdout: &str, name_prefix: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with('/'))
        .filter(|line| line.starts_with(name_prefix))
        .map(str::to_string)
        .collect()
}

impl Transport for Rclone {
    async fn ensure_remote(&self) -> Result<()> {
        let output = self
            .run(["listremotes"])
            .await
            .map_err(|e| AgentError::RemoteNotConfigured(format!("{} ({})", self.remote_name, e)))?;

        let listing = String::from_utf8_lossy(&output.stdout);
        if output.status.success() && has_remote(&listing, &self.remote_name) {
            Ok(())
        } else {
            Err(AgentError::RemoteNotConfigured(self.remote_name.clone()))
        }
    }

    async fn upload(&self, local_path: &Path, destination: &str) -> Result<()> {
        info!("Copying {} to {} using rclone", local_path.display(), destination);

        let output = self
            .run([
                OsStr::new("-v"),
                OsStr::new("copy"),
                local_path.as_os_str(),
                OsStr::new(destination),
                OsStr::new("--log-file"),
                self.log_file.as_os_str(),
            ])
            .await
            .map_err(|e| AgentError::Copy(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AgentError::Copy(failure(&output)))
        }
    }

    async fn list(&self, destination: &str, name_prefix: &str) -> Result<Vec<String>> {
        let output = self
            .run(["lsf", destination, "--order-by", "modtime"])
            .await
            .map_err(|e| AgentError::List(e.to_string()))?;

        if output.status.code() == Some(EXIT_DIR_NOT_FOUND) {
            debug!("Destination {} does not exist yet", destination);
            return Ok(Vec::new());
        }
        if !output.status.success() {
            return Err(AgentError::List(failure(&output)));
        }

        Ok(filter_listing(&String::from_utf8_lossy(&output.stdout), name_prefix))
    }

    async fn delete(&self, remote_path: &str) -> Result<()> {
        info!("Deleting {}", remote_path);

        let output = self
            .run([
                OsStr::new("-v"),
                OsStr::new("delete"),
                OsStr::new(remote_path),
                OsStr::new("--log-file"),
                self.log_file.as_os_str(),
            ])
            .await
            .map_err(|e| AgentError::Delete(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(AgentError::Delete(failure(&output)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write a shell script standing in for rclone.
    fn fake_rclone(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("rclone");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn rclone_with(dir: &Path, body: &str) -> Rclone {
        Rclone::new("googledrive", dir.join("run.log"), Duration::from_secs(10))
            .with_program(fake_rclone(dir, body))
    }

    #[test]
    fn test_has_remote_matches_whole_line() {
        let listing = "googledrive:\nbackblaze:\n";
        assert!(has_remote(listing, "googledrive"));
        assert!(!has_remote(listing, "google"));
        assert!(!has_remote("", "googledrive"));
    }

    #[test]
    fn test_filter_listing_keeps_order_and_prefix() {
        let stdout = "branch1_dhcp_backup_20240101-000000.tar.gz\n\
                      notes.txt\n\
                      old/\n\
                      branch1_dhcp_backup_20240102-000000.tar.gz\n";
        assert_eq!(
            filter_listing(stdout, "branch1_dhcp_backup"),
            vec![
                "branch1_dhcp_backup_20240101-000000.tar.gz",
                "branch1_dhcp_backup_20240102-000000.tar.gz",
            ]
        );
    }

    #[tokio::test]
    async fn test_ensure_remote_missing() {
        let dir = TempDir::new().unwrap();
        let rclone = rclone_with(dir.path(), "echo 'otherremote:'");
        let err = rclone.ensure_remote().await.unwrap_err();
        assert!(matches!(err, AgentError::RemoteNotConfigured(_)));
    }

    #[tokio::test]
    async fn test_ensure_remote_present() {
        let dir = TempDir::new().unwrap();
        let rclone = rclone_with(dir.path(), "echo 'googledrive:'");
        assert!(rclone.ensure_remote().await.is_ok());
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let rclone = rclone_with(dir.path(), "echo 'directory not found' >&2; exit 3");
        let files = rclone.list("googledrive:/dns/branch1", "branch1_dns_backup").await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_is_copy_error() {
        let dir = TempDir::new().unwrap();
        let rclone = rclone_with(dir.path(), "echo 'quota exceeded' >&2; exit 1");
        let err = rclone
            .upload(Path::new("/tmp/a.tar.gz"), "googledrive:/dns/branch1")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Copy(ref m) if m.contains("quota exceeded")));
    }

    #[tokio::test]
    async fn test_hung_tool_times_out() {
        let dir = TempDir::new().unwrap();
        let rclone = Rclone::new("googledrive", dir.path().join("run.log"), Duration::from_millis(200))
            .with_program(fake_rclone(dir.path(), "sleep 5"));
        let err = rclone.delete("googledrive:/dns/branch1/a.tar.gz").await.unwrap_err();
        assert!(matches!(err, AgentError::Delete(ref m) if m.contains("timed out")));
    }
}
