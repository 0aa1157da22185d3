pub mod daemon;
pub mod init;
pub mod preview;
pub mod projects;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use reda_core::config::{self, Config};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Load config (file plus environment overrides) from the user's home.
pub(crate) fn load_config() -> Result<(PathBuf, Config)> {
    let home = home_dir()?;
    let config = config::load_at(&home).context("failed to load config")?;
    Ok((home, config))
}
