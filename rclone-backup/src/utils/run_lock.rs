//! Advisory lock guarding the shared log against concurrent agent processes.

use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Lock file that sits next to the log it protects.
pub fn lock_path(log_file: &Path) -> PathBuf {
    let mut name = log_file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Open (creating if needed) the lock file for `log_file`.
///
/// Callers take the exclusive guard with `try_write()` and hold it for the
/// whole run; a second process gets `WouldBlock`.
pub fn open(log_file: &Path) -> std::io::Result<RwLock<File>> {
    let path = lock_path(log_file);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    Ok(RwLock::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_holder_is_refused() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let log = temp_dir.path().join("backup.log");

        let mut first = open(&log)?;
        let _guard = first.try_write()?;

        let mut second = open(&log)?;
        assert!(second.try_write().is_err());
        Ok(())
    }

    #[test]
    fn test_lock_is_released_on_drop() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let log = temp_dir.path().join("backup.log");

        {
            let mut first = open(&log)?;
            let _guard = first.try_write()?;
        }

        let mut second = open(&log)?;
        assert!(second.try_write().is_ok());
        Ok(())
    }
}
