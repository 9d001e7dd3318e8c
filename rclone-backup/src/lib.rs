//! rclone backup agent library
//!
//! One pass per invocation: archive each configured backup source, ship it
//! with rclone, prune old remote copies and record the outcome in a
//! spreadsheet audit log.

pub mod archive;
pub mod config;
pub mod executor;
pub mod report;
pub mod source;
pub mod transport;
pub mod update;
pub mod utils;

// Re-export commonly used types
pub use config::{BackupType, Settings, SiteConfig};
pub use executor::{BackupExecutor, RunContext, RunSummary};
pub use utils::errors::{AgentError, Result};
