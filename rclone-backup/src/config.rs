//! Configuration management for the backup agent.
//!
//! Two sources feed a run:
//! - the per-site JSON config (`site`, `google_backup_account`, `backup_types`)
//! - agent settings from an optional TOML file with `RCLONE_BACKUP_*`
//!   environment overrides, falling back to built-in defaults.

use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_SITE_CONFIG_PATH: &str = "/srv/rclone/config.json";
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/rclone-backup/settings.toml";

/// Kind of data source a job backs up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Dhcp,
    Dns,
    GorillaManifests,
    MunkiManifests,
    Unifi,
}

impl BackupType {
    pub const ALL: [BackupType; 5] = [
        BackupType::Dhcp,
        BackupType::Dns,
        BackupType::GorillaManifests,
        BackupType::MunkiManifests,
        BackupType::Unifi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Dhcp => "dhcp",
            BackupType::Dns => "dns",
            BackupType::GorillaManifests => "gorillamanifests",
            BackupType::MunkiManifests => "munkimanifests",
            BackupType::Unifi => "unifi",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        BackupType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AgentError::UnknownType(s.to_string()))
    }
}

/// Per-site configuration, loaded from JSON.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub site: String,
    pub google_backup_account: String,
    pub backup_types: Vec<BackupType>,
}

#[derive(Deserialize)]
struct RawSiteConfig {
    site: String,
    google_backup_account: String,
    backup_types: Vec<String>,
}

impl SiteConfig {
    /// Load the site config from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AgentError::Config(format!(
                "Configuration file '{}' does not exist",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse the site config, rejecting unknown backup types up front
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawSiteConfig = serde_json::from_str(content)?;

        if raw.site.trim().is_empty() {
            return Err(AgentError::Config("site must not be empty".into()));
        }

        let backup_types = raw
            .backup_types
            .iter()
            .map(|t| t.parse::<BackupType>())
            .collect::<Result<Vec<_>>>()?;

        Ok(SiteConfig {
            site: raw.site,
            google_backup_account: raw.google_backup_account,
            backup_types,
        })
    }
}

/// Agent settings (TOML + environment overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the pre-configured rclone remote
    pub remote_name: String,

    /// Number of compressed backups to retain remotely per job
    pub keep_count: usize,

    /// Shared local log file for all backup types
    pub log_file: PathBuf,

    /// Number of rotated local log files to retain
    pub max_log_archives: usize,

    /// Scratch directory for archives awaiting upload
    pub scratch_dir: PathBuf,

    /// Service-account credentials for the spreadsheet API
    pub credentials_file: PathBuf,

    /// Upper bound of the randomised startup delay
    pub startup_delay_secs: u64,

    pub archive_timeout_secs: u64,
    pub transfer_timeout_secs: u64,

    /// Keep processing later backup types after a job fails
    pub continue_on_failure: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    pub spreadsheets: SpreadsheetIds,
    pub sources: SourcesConfig,
    pub update: UpdateConfig,
}

/// Spreadsheet used for the audit rows of each backup type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadsheetIds {
    pub dhcp: String,
    pub dns: String,
    pub gorillamanifests: String,
    pub munkimanifests: String,
    pub unifi: String,
}

impl SpreadsheetIds {
    pub fn for_type(&self, backup_type: BackupType) -> &str {
        match backup_type {
            BackupType::Dhcp => &self.dhcp,
            BackupType::Dns => &self.dns,
            BackupType::GorillaManifests => &self.gorillamanifests,
            BackupType::MunkiManifests => &self.munkimanifests,
            BackupType::Unifi => &self.unifi,
        }
    }
}

impl Default for SpreadsheetIds {
    fn default() -> Self {
        Self {
            dhcp: "1QWORlX7No7FN2woNCmrf4xmtI1cRNC3pxHpk7auXxuE".to_string(),
            dns: "1jmRT9r900HD-MVYCq-JYwl2p8aIcdsqrqivnomvMFG8".to_string(),
            gorillamanifests: "1y4wpZvrD9_f9t5NypY-JWjAWBjXGbsJ5fEB3pqelRo4".to_string(),
            munkimanifests: "1mGkoHwadX2aMW7UKjJGKmAkmfXZWd3Ark5rixv6dvgw".to_string(),
            unifi: "1FOAeJrO_NBspwAZGf4_kRTnzh0dXCIcXzhBcDQSHoew".to_string(),
        }
    }
}

/// Where each backup type's data lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub dhcp: PathBuf,
    pub dns: PathBuf,
    pub gorillamanifests: PathBuf,
    pub munkimanifests: PathBuf,

    /// UniFi autobackup locations, checked in order
    pub unifi_candidates: Vec<PathBuf>,

    /// Suffix of UniFi autobackup files
    pub unifi_suffix: String,

    /// A candidate qualifies if it holds a backup file newer than this
    pub freshness_days: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dhcp: PathBuf::from("/etc/dhcp"),
            dns: PathBuf::from("/etc/bind"),
            gorillamanifests: PathBuf::from("/srv/www/gorilla/manifests"),
            munkimanifests: PathBuf::from("/srv/www/munki/manifests"),
            unifi_candidates: vec![
                PathBuf::from("/var/lib/unifi/backup/autobackup"), // Software Controller
                PathBuf::from("/data/unifi/data/backup/autobackup"), // Cloud Key, newer firmware
                PathBuf::from("/srv/unifi/data/backup/autobackup"), // Cloud Key, older firmware
                PathBuf::from("/usr/lib/unifi/data/backup/autobackup"),
                PathBuf::from("/opt/unifi/data/backup/autobackup"),
            ],
            unifi_suffix: ".unf".to_string(),
            freshness_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Canonical copy of the agent binary; empty disables self-update
    pub url: String,

    pub timeout_secs: u64,

    /// Owner applied to the replaced binary (None leaves ownership alone)
    pub owner_uid: Option<u32>,

    /// Group applied alongside `owner_uid`
    pub owner_gid: Option<u32>,

    /// systemd unit restarted after an update; None re-executes in place
    pub restart_unit: Option<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 10,
            owner_uid: Some(0),
            owner_gid: Some(0),
            restart_unit: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote_name: "googledrive".to_string(),
            keep_count: 5,
            log_file: PathBuf::from("/var/log/rclone-backup.log"),
            max_log_archives: 10,
            scratch_dir: std::env::temp_dir(),
            credentials_file: PathBuf::from("/srv/rclone/rclone-credentials.json"),
            startup_delay_secs: 1200,
            archive_timeout_secs: 3600,
            transfer_timeout_secs: 3600,
            continue_on_failure: false,
            log_level: "info".to_string(),
            spreadsheets: SpreadsheetIds::default(),
            sources: SourcesConfig::default(),
            update: UpdateConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or the default location if present),
    /// then apply `RCLONE_BACKUP_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::from(Path::new(DEFAULT_SETTINGS_PATH)).required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("RCLONE_BACKUP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| AgentError::Config(e.to_string()))
    }

    /// Check that every configured backup type can be reported.
    pub fn validate_for(&self, site: &SiteConfig) -> Result<()> {
        for backup_type in &site.backup_types {
            if self.spreadsheets.for_type(*backup_type).trim().is_empty() {
                return Err(AgentError::Config(format!(
                    "no spreadsheet configured for backup type '{}'",
                    backup_type
                )));
            }
        }
        if self.remote_name.trim().is_empty() {
            return Err(AgentError::Config("remote_name must not be empty".into()));
        }
        Ok(())
    }
}
