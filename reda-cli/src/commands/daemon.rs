//! `reda-sync daemon`: weekly scheduler lifecycle.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use reda_daemon::paths::{err_log_path, log_path, socket_path};
use reda_daemon::{request_run, request_status, request_stop, start_blocking, DaemonError};
use reda_sync::pipeline::RunSummary;

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (scheduler + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Ask the running daemon to sync now and wait for the result.
    Run(DaemonRunArgs),
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

#[derive(Args, Debug)]
pub struct DaemonRunArgs {
    /// Only run this configured project (exact name).
    #[arg(long, short = 'p')]
    pub project: Option<String>,

    /// Fetch and reconcile, but leave the spreadsheet untouched.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the warnings-and-errors log.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Run(args) => {
            let data = request_run(&home, args.project, args.dry_run)
                .context("daemon run failed")?;
            let summary: RunSummary =
                serde_json::from_value(data).context("unexpected run summary from daemon")?;
            super::run::print_summary(&summary);
            if !summary.is_success() {
                anyhow::bail!(
                    "{} of {} projects failed",
                    summary.failed(),
                    summary.projects.len()
                );
            }
        }
        DaemonCommand::Logs(args) => {
            if args.stderr_only {
                print_tail(&err_log_path(&home), args.lines)
                    .context("failed to read daemon error log")?;
            } else {
                print_tail(&log_path(&home), args.lines).context("failed to read daemon log")?;
                print_tail(&err_log_path(&home), args.lines)
                    .context("failed to read daemon error log")?;
            }
        }
    }

    Ok(())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut tail = VecDeque::<String>::with_capacity(lines);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        tail.push_back(line);
        if tail.len() > lines {
            tail.pop_front();
        }
    }

    println!("==> {} <==", path.display());
    tail.iter().for_each(|line| println!("{line}"));
    Ok(())
}
