//! Remote retention: keep the newest `keep_count` archives, delete the rest.

use super::{remote_path, Transport};
use tracing::{info, warn};

/// The oldest entries beyond `keep_count`, given a listing sorted oldest first.
pub fn excess(existing: &[String], keep_count: usize) -> &[String] {
    let count = existing.len().saturating_sub(keep_count);
    &existing[..count]
}

/// Delete the excess oldest archives under `destination`.
///
/// Every excess entry is attempted in order; a failed delete is logged and
/// does not stop the remaining ones. Returns the names actually deleted.
pub async fn prune<T: Transport>(
    transport: &T,
    destination: &str,
    existing: &[String],
    keep_count: usize,
) -> Vec<String> {
    let to_delete = excess(existing, keep_count);
    if to_delete.is_empty() {
        return Vec::new();
    }

    info!("More than {} backups present, deleting oldest", keep_count);

    let mut deleted = Vec::with_capacity(to_delete.len());
    for name in to_delete {
        match transport.delete(&remote_path(destination, name)).await {
            Ok(()) => deleted.push(name.clone()),
            Err(e) => warn!("{}", e),
        }
    }
    deleted
}
