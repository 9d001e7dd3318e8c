//! Self-update mechanism for the backup agent.
//!
//! Before any job runs, the agent fetches the canonical copy of its own
//! binary and compares SHA-256 digests with the running one. On a mismatch
//! the binary is replaced and the agent restarts, either through the service
//! manager or by re-executing itself.

use crate::config::UpdateConfig;
use crate::utils::errors::{AgentError, Result};
use nix::unistd::{Gid, Uid};
use sha2::{Digest, Sha256};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// rwxr-xr-x
const BINARY_MODE: u32 = 0o755;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No update URL configured
    Disabled,
    /// Canonical copy could not be fetched; carry on with the running one
    Unavailable,
    UpToDate,
    /// Binary replaced; the caller must restart before running any job
    Updated,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct SelfUpdater {
    config: UpdateConfig,
    target: PathBuf,
    http: reqwest::Client,
}

impl SelfUpdater {
    pub fn new(config: UpdateConfig, target: PathBuf) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, target, http })
    }

    /// Updater for the currently running executable.
    pub fn for_current_exe(config: UpdateConfig) -> Result<Self> {
        Self::new(config, std::env::current_exe()?)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Fetch the canonical copy and replace the running binary if it differs.
    pub async fn maybe_update(&self) -> Result<UpdateOutcome> {
        if self.config.url.trim().is_empty() {
            return Ok(UpdateOutcome::Disabled);
        }

        match self.fetch().await {
            Some(remote) => self.apply(&remote),
            None => Ok(UpdateOutcome::Unavailable),
        }
    }

    async fn fetch(&self) -> Option<Vec<u8>> {
        let response = self
            .http
            .get(&self.config.url)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .send()
            .await;

        let response = match response {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!("Failed to download the remote binary: HTTP {}", resp.status());
                return None;
            }
            Err(e) => {
                warn!("Failed to download the remote binary: {}", e);
                return None;
            }
        };

        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => {
                warn!("Remote binary at {} is empty, skipping update", self.config.url);
                None
            }
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!("Failed to download the remote binary: {}", e);
                None
            }
        }
    }

    /// Replace the target with `remote` unless their digests already match.
    pub fn apply(&self, remote: &[u8]) -> Result<UpdateOutcome> {
        let current = std::fs::read(&self.target)?;
        if sha256_hex(&current) == sha256_hex(remote) {
            return Ok(UpdateOutcome::UpToDate);
        }

        info!("The agent differs from the remote version. Updating...");

        let staged = staged_path(&self.target)?;
        let result = self.install(&staged, remote);
        if result.is_err() {
            let _ = std::fs::remove_file(&staged);
        }
        result?;

        info!("Installed {} ({})", self.target.display(), sha256_hex(remote));
        Ok(UpdateOutcome::Updated)
    }

    fn install(&self, staged: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(staged, bytes)?;
        std::fs::set_permissions(staged, std::fs::Permissions::from_mode(BINARY_MODE))?;

        let uid = self.config.owner_uid.map(Uid::from_raw);
        let gid = self.config.owner_gid.map(Gid::from_raw);
        if uid.is_some() || gid.is_some() {
            nix::unistd::chown(staged, uid, gid)
                .map_err(|e| AgentError::Update(format!("chown {}: {}", staged.display(), e)))?;
        }

        // rename keeps the running image intact, unlike writing over it
        std::fs::rename(staged, &self.target)?;
        Ok(())
    }

    /// Hand over to the freshly installed binary. Only returns on failure
    /// (exec) or once the service manager has accepted the restart.
    pub fn restart(&self) -> Result<()> {
        match &self.config.restart_unit {
            Some(unit) => {
                info!("Agent updated. Restarting {} ...", unit);
                let status = std::process::Command::new("systemctl")
                    .args(["restart", unit])
                    .status()?;
                if status.success() {
                    Ok(())
                } else {
                    error!("systemctl restart exited with: {}", status);
                    Err(AgentError::Update(format!("systemctl restart {} failed", unit)))
                }
            }
            None => {
                info!("Agent updated. Re-executing...");
                let program = CString::new(self.target.as_os_str().as_bytes())
                    .map_err(|e| AgentError::Update(e.to_string()))?;
                let args = std::env::args_os()
                    .map(|a| CString::new(a.as_bytes()))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| AgentError::Update(e.to_string()))?;

                let err = match nix::unistd::execv(&program, &args) {
                    Ok(never) => match never {},
                    Err(e) => e,
                };
                Err(AgentError::Update(format!("execv {}: {}", self.target.display(), err)))
            }
        }
    }
}

/// Sibling file the new binary is written to before the swap.
fn staged_path(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| AgentError::Update(format!("invalid target {}", target.display())))?;
    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    staged.push(".update");
    Ok(target.with_file_name(staged))
}
