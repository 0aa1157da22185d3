//! `reda-sync init [--force]`

use anyhow::{Context, Result};
use clap::Args;

use reda_core::config::{self, ENV_API_KEY, ENV_SHEETS_TOKEN_FILE, ENV_SPREADSHEET_ID};

use super::home_dir;

/// Write the default config file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config with defaults.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let path = config::config_path_at(&home);
        let existed = path.exists();

        let config = config::init_at(&home, self.force)
            .with_context(|| format!("failed to initialize {}", path.display()))?;

        if existed && !self.force {
            println!("✓ Config already present at {}", path.display());
            println!("  Use --force to reset it to defaults.");
            return Ok(());
        }

        println!(
            "✓ Wrote {} ({} projects)",
            path.display(),
            config.projects.len()
        );
        println!("  Next: set api.api_key and sheets.spreadsheet_id, or export");
        println!("  {ENV_API_KEY}, {ENV_SPREADSHEET_ID} and {ENV_SHEETS_TOKEN_FILE}.");
        Ok(())
    }
}
