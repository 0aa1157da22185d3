//! `reda-sync projects`: configured projects in run order.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use super::load_config;

#[derive(Args, Debug)]
pub struct ProjectsArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct ProjectRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "id")]
    id: u32,
}

impl ProjectsArgs {
    pub fn run(self) -> Result<()> {
        let (_, config) = load_config()?;
        let rows: Vec<ProjectRow> = config
            .projects
            .iter()
            .enumerate()
            .map(|(i, p)| ProjectRow {
                position: i + 1,
                name: p.name.0.clone(),
                id: p.id,
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize projects")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("No projects configured.");
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("Weekly run: {} (UTC{:+})", config.schedule, config.report_utc_offset_hours);
        Ok(())
    }
}
