//! `reda-sync run`: one in-process fetch → reconcile → publish pass.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use reda_sync::pipeline::{self, ProjectOutcome, RunOptions, RunSummary};

use super::load_config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only run this configured project (exact name).
    #[arg(long, short = 'p')]
    pub project: Option<String>,

    /// Fetch and reconcile, but leave the spreadsheet untouched.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "rows")]
    rows: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "ms")]
    duration_ms: u64,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let (_, config) = load_config()?;
        let options = RunOptions {
            project: self.project,
            dry_run: self.dry_run,
        };
        let summary = pipeline::run(&config, &options).context("run failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize run summary")?
            );
        } else {
            print_summary(&summary);
        }

        if !summary.is_success() {
            bail!(
                "{} of {} projects failed",
                summary.failed(),
                summary.projects.len()
            );
        }
        Ok(())
    }
}

pub(crate) fn print_summary(summary: &RunSummary) {
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}Run at {} | {} published | {} empty | {} failed",
        summary.started_at.format("%d/%m/%Y %H:%M:%S"),
        summary.published(),
        summary.empty(),
        summary.failed(),
    );

    let rows: Vec<OutcomeRow> = summary
        .projects
        .iter()
        .map(|report| {
            let (status, rows, detail) = describe(&report.outcome);
            OutcomeRow {
                project: report.project.clone(),
                status,
                rows,
                detail,
                duration_ms: report.duration_ms,
            }
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn describe(outcome: &ProjectOutcome) -> (String, String, String) {
    match outcome {
        ProjectOutcome::Published { rows, tab_created } => (
            "PUBLISHED".green().bold().to_string(),
            rows.to_string(),
            if *tab_created {
                "tab created".to_string()
            } else {
                "tab replaced".to_string()
            },
        ),
        ProjectOutcome::WouldPublish { rows } => (
            "WOULD PUBLISH".cyan().bold().to_string(),
            rows.to_string(),
            "dry run".to_string(),
        ),
        ProjectOutcome::Empty => (
            "EMPTY".bright_black().bold().to_string(),
            "0".to_string(),
            "no inventory; tab untouched".to_string(),
        ),
        ProjectOutcome::Failed { error } => (
            "FAILED".red().bold().to_string(),
            "-".to_string(),
            error.clone(),
        ),
    }
}
