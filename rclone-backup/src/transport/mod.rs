//! Remote storage transport.
//!
//! The agent never talks to a storage backend directly: an external
//! transfer tool (rclone) owns retries, credentials and its own logging.
//! [`Transport`] is the narrow surface the executor needs from it.

pub mod rclone;
pub mod retention;

use crate::config::BackupType;
use crate::utils::errors::Result;
use std::path::Path;

pub use rclone::Rclone;

#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Fail with `RemoteNotConfigured` unless the configured remote exists.
    async fn ensure_remote(&self) -> Result<()>;

    /// Copy one local file into `destination`.
    async fn upload(&self, local_path: &Path, destination: &str) -> Result<()>;

    /// Names under `destination` starting with `name_prefix`, oldest first.
    /// An absent destination yields an empty list.
    async fn list(&self, destination: &str, name_prefix: &str) -> Result<Vec<String>>;

    /// Delete a single remote file by its full remote path.
    async fn delete(&self, remote_path: &str) -> Result<()>;
}

/// `{remote}:/{backup_type}/{site}`
pub fn destination_uri(remote_name: &str, backup_type: BackupType, site: &str) -> String {
    format!("{}:/{}/{}", remote_name, backup_type, site)
}

/// Full remote path of `file_name` inside `destination`.
pub fn remote_path(destination: &str, file_name: &str) -> String {
    format!("{}/{}", destination.trim_end_matches('/'), file_name)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::utils::errors::AgentError;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, HashSet};

    /// In-memory remote: each destination holds its files oldest first.
    #[derive(Default)]
    pub struct MemoryTransport {
        pub remote_missing: bool,
        pub fail_uploads: bool,
        pub fail_list: bool,
        pub fail_deletes: HashSet<String>,
        pub files: RefCell<BTreeMap<String, Vec<String>>>,
        pub uploads: RefCell<Vec<String>>,
        pub deletes: RefCell<Vec<String>>,
    }

    impl MemoryTransport {
        pub fn seed(&self, destination: &str, names: &[&str]) {
            self.files.borrow_mut().insert(
                destination.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            );
        }

        pub fn files_at(&self, destination: &str) -> Vec<String> {
            self.files
                .borrow()
                .get(destination)
                .cloned()
                .unwrap_or_default()
        }
    }

    impl Transport for MemoryTransport {
        async fn ensure_remote(&self) -> Result<()> {
            if self.remote_missing {
                return Err(AgentError::RemoteNotConfigured("memory".into()));
            }
            Ok(())
        }

        async fn upload(&self, local_path: &Path, destination: &str) -> Result<()> {
            if self.fail_uploads {
                return Err(AgentError::Copy("remote rejected the upload".into()));
            }
            let name = local_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.uploads.borrow_mut().push(remote_path(destination, &name));
            self.files
                .borrow_mut()
                .entry(destination.to_string())
                .or_default()
                .push(name);
            Ok(())
        }

        async fn list(&self, destination: &str, name_prefix: &str) -> Result<Vec<String>> {
            if self.fail_list {
                return Err(AgentError::List("listing unavailable".into()));
            }
            Ok(self
                .files_at(destination)
                .into_iter()
                .filter(|n| n.starts_with(name_prefix))
                .collect())
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.deletes.borrow_mut().push(path.to_string());
            if self.fail_deletes.contains(path) {
                return Err(AgentError::Delete(format!("{}: permission denied", path)));
            }
            let (destination, name) = path.rsplit_once('/').unwrap_or(("", path));
            if let Some(files) = self.files.borrow_mut().get_mut(destination) {
                files.retain(|f| f != name);
            }
            Ok(())
        }
    }
}
