use std::path::{Path, PathBuf};

use reda_core::config::config_dir_at;

pub const DAEMON_LABEL: &str = "mx.reda.sync";
pub const DAEMON_LOG: &str = "daemon.log";
pub const DAEMON_ERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn reda_root(home: &Path) -> PathBuf {
    config_dir_at(home)
}

pub fn socket_path(home: &Path) -> PathBuf {
    reda_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    reda_root(home).join("logs")
}

/// Every event at the configured level.
pub fn log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_LOG)
}

/// Warnings and errors only.
pub fn err_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_ERR_LOG)
}
