//! Size-based rotation for `logs/daemon.log` and `logs/daemon-err.log`.
//!
//! A live file past the size cap becomes `<name>.1`, older copies shift up by
//! one, and anything beyond `max_files` is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{err_log_path, log_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    /// 10 MiB, five copies.
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl RotationPolicy {
    /// Rotate `path` when it has grown to `max_bytes` or more.
    ///
    /// Returns `Ok(false)` when the file is small enough or does not exist.
    /// The writer reopens the live path per event, so no handle needs to be
    /// swapped after a rotation.
    pub fn rotate_if_needed(&self, path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.max_files == 0 {
            return Ok(false);
        }

        remove_if_present(&rotated_path(path, self.max_files))?;
        for n in (1..self.max_files).rev() {
            let from = rotated_path(path, n);
            if from.exists() {
                fs::rename(&from, rotated_path(path, n + 1))?;
            }
        }
        fs::rename(path, rotated_path(path, 1))?;
        Ok(true)
    }
}

/// Rotate both daemon logs under `home`; failures are logged, never raised.
pub fn rotate_daemon_logs(home: &Path, policy: RotationPolicy) {
    for path in [log_path(home), err_log_path(home)] {
        match policy.rotate_if_needed(&path) {
            Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `daemon.log` + 2 → `daemon.log.2`.
fn rotated_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().map(|s| s.to_os_string()).unwrap_or_default();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
