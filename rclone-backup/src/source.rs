//! Backup source discovery.
//!
//! Most backup types live at a fixed directory. UniFi controllers write
//! autobackups to one of several install-dependent locations, so the locator
//! picks the first candidate holding a recent `.unf` file.

use crate::config::{BackupType, SourcesConfig};
use crate::utils::errors::{AgentError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use walkdir::WalkDir;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

pub struct SourceLocator {
    sources: SourcesConfig,
}

impl SourceLocator {
    pub fn new(sources: SourcesConfig) -> Self {
        Self { sources }
    }

    /// Resolve the directory to back up for `backup_type`.
    pub fn locate(&self, backup_type: BackupType) -> Result<PathBuf> {
        self.locate_at(backup_type, SystemTime::now())
    }

    /// Like [`locate`](Self::locate), measuring freshness against `now`.
    pub fn locate_at(&self, backup_type: BackupType, now: SystemTime) -> Result<PathBuf> {
        let fixed = match backup_type {
            BackupType::Dhcp => &self.sources.dhcp,
            BackupType::Dns => &self.sources.dns,
            BackupType::GorillaManifests => &self.sources.gorillamanifests,
            BackupType::MunkiManifests => &self.sources.munkimanifests,
            BackupType::Unifi => return self.discover_fresh(now),
        };

        if fixed.is_dir() {
            info!("Backup directory found: {}", fixed.display());
            Ok(fixed.clone())
        } else {
            Err(AgentError::SourceNotFound(fixed.clone()))
        }
    }

    /// Resolve a raw type identifier, as found in an unvalidated config.
    pub fn locate_named(&self, backup_type: &str) -> Result<PathBuf> {
        self.locate(backup_type.parse()?)
    }

    fn discover_fresh(&self, now: SystemTime) -> Result<PathBuf> {
        let window = Duration::from_secs(self.sources.freshness_days.saturating_mul(SECS_PER_DAY));
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);

        for candidate in &self.sources.unifi_candidates {
            let exists = candidate
                .try_exists()
                .map_err(|e| AgentError::Discovery(format!("{}: {}", candidate.display(), e)))?;
            if !exists {
                debug!("Autobackup candidate absent: {}", candidate.display());
                continue;
            }
            if has_fresh_file(candidate, &self.sources.unifi_suffix, cutoff)? {
                info!("Backup directory found: {}", candidate.display());
                return Ok(candidate.clone());
            }
            debug!("No recent autobackup in {}", candidate.display());
        }

        Err(AgentError::NoRecentBackup)
    }
}

/// True if `dir` directly contains a `suffix` file modified at or after `cutoff`.
fn has_fresh_file(dir: &Path, suffix: &str, cutoff: SystemTime) -> Result<bool> {
    let walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false);

    for entry in walker {
        let entry = entry.map_err(|e| AgentError::Discovery(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !entry.file_name().to_string_lossy().ends_with(suffix) {
            continue;
        }

        let discovery = |e: &dyn std::fmt::Display| {
            AgentError::Discovery(format!("{}: {}", entry.path().display(), e))
        };
        let modified = entry
            .metadata()
            .map_err(|e| discovery(&e))?
            .modified()
            .map_err(|e| discovery(&e))?;

        if modified >= cutoff {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn sources_with(candidates: Vec<PathBuf>) -> SourcesConfig {
        SourcesConfig {
            unifi_candidates: candidates,
            ..SourcesConfig::default()
        }
    }

    #[test]
    fn test_fixed_path_found() {
        let temp_dir = TempDir::new().unwrap();
        let sources = SourcesConfig {
            dhcp: temp_dir.path().to_path_buf(),
            ..SourcesConfig::default()
        };
        let locator = SourceLocator::new(sources);
        assert_eq!(locator.locate(BackupType::Dhcp).unwrap(), temp_dir.path());
    }

    #[test]
    fn test_fixed_path_missing() {
        let temp_dir = TempDir::new().unwrap();
        let sources = SourcesConfig {
            dns: temp_dir.path().join("bind"),
            ..SourcesConfig::default()
        };
        let locator = SourceLocator::new(sources);
        let err = locator.locate(BackupType::Dns).unwrap_err();
        assert!(matches!(err, AgentError::SourceNotFound(_)));
    }

    #[test]
    fn test_unknown_named_type() {
        let locator = SourceLocator::new(SourcesConfig::default());
        let err = locator.locate_named("printers").unwrap_err();
        assert!(matches!(err, AgentError::UnknownType(_)));
    }

    #[test]
    fn test_fresh_unf_in_first_candidate() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("a");
        let second = temp_dir.path().join("b");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("autobackup_1.unf"), b"x").unwrap();
        fs::write(second.join("autobackup_2.unf"), b"x").unwrap();

        let locator = SourceLocator::new(sources_with(vec![first.clone(), second]));
        assert_eq!(locator.locate(BackupType::Unifi).unwrap(), first);
    }

    #[test]
    fn test_skips_missing_and_stale_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let stale = temp_dir.path().join("stale");
        let fresh = temp_dir.path().join("fresh");
        fs::create_dir_all(&stale).unwrap();
        fs::create_dir_all(&fresh).unwrap();
        fs::write(stale.join("old.unf"), b"x").unwrap();
        fs::write(fresh.join("new.unf"), b"x").unwrap();

        // Backdate the stale candidate's only file
        let old = fs::File::options().write(true).open(stale.join("old.unf")).unwrap();
        old.set_modified(SystemTime::now() - WEEK * 3).unwrap();

        let locator = SourceLocator::new(sources_with(vec![missing, stale, fresh.clone()]));
        assert_eq!(locator.locate(BackupType::Unifi).unwrap(), fresh);
    }

    #[test]
    fn test_ignores_files_with_other_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("autobackup");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("autobackup_meta.json"), b"{}").unwrap();

        let locator = SourceLocator::new(sources_with(vec![dir]));
        let err = locator.locate(BackupType::Unifi).unwrap_err();
        assert!(matches!(err, AgentError::NoRecentBackup));
    }

    #[test]
    fn test_all_candidates_stale() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("autobackup");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("autobackup_1.unf"), b"x").unwrap();

        let locator = SourceLocator::new(sources_with(vec![dir]));
        let later = SystemTime::now() + WEEK + Duration::from_secs(60);
        let err = locator.locate_at(BackupType::Unifi, later).unwrap_err();
        assert!(matches!(err, AgentError::NoRecentBackup));
    }

    #[test]
    fn test_huge_freshness_window_accepts_any_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("autobackup");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("autobackup_1.unf"), b"x").unwrap();

        let sources = SourcesConfig {
            freshness_days: u64::MAX,
            ..sources_with(vec![dir.clone()])
        };
        let locator = SourceLocator::new(sources);
        assert_eq!(locator.locate(BackupType::Unifi).unwrap(), dir);
    }

    #[test]
    fn test_unreadable_candidate_is_discovery_error() {
        // root ignores directory permissions
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        let candidate = locked.join("autobackup");
        fs::create_dir_all(&candidate).unwrap();
        fs::write(candidate.join("autobackup_1.unf"), b"x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let locator = SourceLocator::new(sources_with(vec![candidate]));
        let result = locator.locate(BackupType::Unifi);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result.unwrap_err(), AgentError::Discovery(_)));
    }

    #[test]
    fn test_nested_unf_files_are_not_counted() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("autobackup");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/autobackup_1.unf"), b"x").unwrap();

        let locator = SourceLocator::new(sources_with(vec![dir]));
        assert!(matches!(
            locator.locate(BackupType::Unifi).unwrap_err(),
            AgentError::NoRecentBackup
        ));
    }
}
