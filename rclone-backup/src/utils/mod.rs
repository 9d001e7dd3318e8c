//! Utility modules for the backup agent.

pub mod errors;
pub mod log_rotation;
pub mod logger;
pub mod run_lock;

pub use errors::{AgentError, Result};
