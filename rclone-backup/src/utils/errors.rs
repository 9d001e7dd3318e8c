//! Custom error types for the backup agent.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown backup type: {0}")]
    UnknownType(String),

    #[error("Detecting backup source failed: {0}")]
    Discovery(String),

    #[error("No autobackup path with recent backups detected")]
    NoRecentBackup,

    #[error("Backup source '{}' does not exist", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Compressing source failed: {0}")]
    Compression(String),

    #[error("Rclone remote '{0}' does not exist")]
    RemoteNotConfigured(String),

    #[error("Copying to destination failed: {0}")]
    Copy(String),

    #[error("Listing remote backups failed: {0}")]
    List(String),

    #[error("Deleting remote backup failed: {0}")]
    Delete(String),

    #[error("Failed to update Google Sheet: {0}")]
    Report(String),

    #[error("Self-update failed: {0}")]
    Update(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Reporting failures abort the whole run; everything else is job-local.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Report(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
