//! reda-sync: REDA inventory and funding sync into Google Sheets.
//!
//! # Usage
//!
//! ```text
//! reda-sync init [--force]
//! reda-sync projects [--json]
//! reda-sync run [--project <name>] [--dry-run] [--json]
//! reda-sync preview <project> [--limit <n>] [--json]
//! reda-sync daemon start|stop|status|run|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, preview::PreviewArgs, projects::ProjectsArgs,
    run::RunArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "reda-sync",
    version,
    about = "Mirror REDA project inventory and collections into a Google spreadsheet",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default config to ~/.reda-sync/config.yaml.
    Init(InitArgs),

    /// List configured projects in run order.
    Projects(ProjectsArgs),

    /// Fetch, reconcile, and publish every project once.
    Run(RunArgs),

    /// Fetch and reconcile one project without publishing.
    Preview(PreviewArgs),

    /// Manage the scheduling daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Projects(args) => args.run(),
        Commands::Run(args) => args.run(),
        Commands::Preview(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
