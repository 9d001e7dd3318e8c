//! Per-job state: identity, naming and status.

use crate::archive;
use crate::config::{BackupType, Settings, SiteConfig};
use crate::transport::destination_uri;
use chrono::NaiveDateTime;
use std::fmt;

/// Outcome recorded for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Unknown,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Unknown => "UNKNOWN",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Unknown)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Steps a job moves through; any failure jumps straight to `Reported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStage {
    Start,
    SourceResolved,
    Archived,
    Uploaded,
    Pruned,
    Reported,
}

/// One configured backup type, processed once per run.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub backup_type: BackupType,
    pub destination_uri: String,
    /// Archive name without extension
    pub archive_name: String,
    pub name_prefix: String,
    pub spreadsheet_id: String,
    pub tab_name: String,
    pub stage: JobStage,
    status: JobStatus,
}

impl BackupJob {
    pub fn new(
        backup_type: BackupType,
        site: &SiteConfig,
        settings: &Settings,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            backup_type,
            destination_uri: destination_uri(&settings.remote_name, backup_type, &site.site),
            archive_name: archive::archive_name(&site.site, backup_type, timestamp),
            name_prefix: archive::name_prefix(&site.site, backup_type),
            spreadsheet_id: settings.spreadsheets.for_type(backup_type).to_string(),
            tab_name: format!("{}.{}", backup_type, site.site),
            stage: JobStage::Start,
            status: JobStatus::Unknown,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Record a terminal status. The first terminal status wins, so a later
    /// SUCCESS never hides an earlier FAILURE. Returns whether it was applied.
    pub fn settle(&mut self, status: JobStatus) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    /// Advance to `stage`; stages never move backwards.
    pub fn advance(&mut self, stage: JobStage) {
        if stage > self.stage {
            self.stage = stage;
        }
    }
}
