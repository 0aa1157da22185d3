//! `reda-sync preview <project>`: merged rows for one project, nothing published.

use anyhow::{ensure, Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use reda_core::types::MergedRow;
use reda_sync::{pipeline, RedaClient};

use super::load_config;

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Configured project name (exact).
    pub project: String,

    /// Show at most this many rows.
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Emit merged rows as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct PreviewRow {
    #[tabled(rename = "Unidad")]
    unit: String,
    #[tabled(rename = "Estatus")]
    status: String,
    #[tabled(rename = "m2")]
    area: f64,
    #[tabled(rename = "Precio")]
    price: f64,
    #[tabled(rename = "Fecha Bloqueo")]
    lock_date: String,
    #[tabled(rename = "Fecha Formalización")]
    formalized_date: String,
    #[tabled(rename = "Valor Cobrado")]
    collected: f64,
}

impl From<&MergedRow> for PreviewRow {
    fn from(row: &MergedRow) -> Self {
        Self {
            unit: row.unit_name.clone(),
            status: row.status.clone(),
            area: row.area,
            price: row.price,
            lock_date: row.lock_date.to_string(),
            formalized_date: row.formalized_date.to_string(),
            collected: row.amount_collected,
        }
    }
}

impl PreviewArgs {
    pub fn run(self) -> Result<()> {
        let (_, config) = load_config()?;
        ensure!(
            !config.api.api_key.trim().is_empty(),
            "api.api_key is empty; set it in the config or export {}",
            reda_core::config::ENV_API_KEY
        );

        let source = RedaClient::new(&config.api);
        let rows = pipeline::preview(&config, &source, &self.project)
            .with_context(|| format!("preview failed for '{}'", self.project))?;
        let total = rows.len();
        let shown = &rows[..self.limit.unwrap_or(total).min(total)];

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(shown).context("failed to serialize rows")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("'{}' returned no inventory.", self.project);
            return Ok(());
        }
        let mut table = Table::new(shown.iter().map(PreviewRow::from));
        table.with(Style::rounded());
        println!("{table}");
        println!("{} of {} units shown", shown.len(), total);
        Ok(())
    }
}
