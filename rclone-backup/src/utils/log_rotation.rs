//! Numbered rotation of the shared log file.
//!
//! Runs once at process start: `log.1` becomes `log.2` and so on up to
//! `max_archives`, the live log becomes `log.1`, and a fresh empty log is
//! created. Whatever sat at `log.{max_archives}` is overwritten.

use std::fs;
use std::path::{Path, PathBuf};

/// Path of the rotated archive with the given index.
pub fn archive_path(log_file: &Path, index: usize) -> PathBuf {
    let mut name = log_file.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

/// Rotate `log_file`, keeping at most `max_archives` numbered copies.
pub fn rotate(log_file: &Path, max_archives: usize) -> std::io::Result<()> {
    if let Some(parent) = log_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if log_file.exists() {
        if max_archives == 0 {
            fs::remove_file(log_file)?;
        } else {
            for i in (1..max_archives).rev() {
                let old = archive_path(log_file, i);
                if old.exists() {
                    fs::rename(&old, archive_path(log_file, i + 1))?;
                }
            }
            fs::rename(log_file, archive_path(log_file, 1))?;
        }
    }

    fs::File::create(log_file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotate_creates_empty_log() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let log = temp_dir.path().join("backup.log");

        rotate(&log, 10)?;

        assert!(log.exists());
        assert_eq!(fs::read_to_string(&log)?, "");
        assert!(!archive_path(&log, 1).exists());
        Ok(())
    }

    #[test]
    fn test_rotate_keeps_exactly_max_archives() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let log = temp_dir.path().join("backup.log");
        let max = 10;

        // N + 1 runs, each writing its own number into the live log
        for run in 1..=max + 1 {
            rotate(&log, max)?;
            fs::write(&log, format!("run {}", run))?;
        }
        // One more rotation pushes run N + 1 into the archives
        rotate(&log, max)?;

        for index in 1..=max {
            let content = fs::read_to_string(archive_path(&log, index))?;
            // .1 is the most recent run, .N the oldest kept
            assert_eq!(content, format!("run {}", max + 2 - index));
        }
        assert!(!archive_path(&log, max + 1).exists());
        Ok(())
    }

    #[test]
    fn test_archive_path_appends_index() {
        let path = archive_path(Path::new("/var/log/rclone-backup.log"), 3);
        assert_eq!(path, PathBuf::from("/var/log/rclone-backup.log.3"));
    }
}
