//! Full-replace publishing of merged rows to a spreadsheet tab.
//!
//! ## `publish`: 3-step protocol
//!
//! 1. List tab titles; add a tab named after the project if none matches exactly.
//! 2. Clear the whole `A:I` region so rows from a longer previous run vanish.
//! 3. Write the header plus one row per [`MergedRow`] to `A1:I<n>`.
//!
//! The steps are separate round-trips with no transaction between them; runs
//! are serialized by the caller.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Value};

use reda_core::config::{Credential, SheetsConfig};
use reda_core::types::{MergedRow, ProjectName};

use crate::error::SyncError;
use crate::http::{self, CallError};

/// Column headers, in write order. The region is always this wide.
pub const HEADER: [&str; 9] = [
    "Hora de consulta",
    "Proyecto",
    "Unidad",
    "Estatus",
    "m2",
    "Precio",
    "Fecha Bloqueo",
    "Fecha Formalización",
    "Valor Cobrado",
];

const LAST_COLUMN: char = 'I';

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// The destination tabular store, addressed by A1 ranges.
pub trait SheetStore {
    /// Titles of every tab in the spreadsheet.
    fn list_tabs(&self) -> Result<Vec<String>, SyncError>;
    /// Add an empty tab.
    fn add_tab(&self, title: &str) -> Result<(), SyncError>;
    /// Blank every cell in `range`.
    fn clear_range(&self, range: &str) -> Result<(), SyncError>;
    /// Overwrite `range` with `rows` (row-major, raw values).
    fn write_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SyncError>;
}

/// Outcome of one successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub tab_created: bool,
    pub rows: usize,
    pub range: String,
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// Replace the contents of the project's tab with `rows`.
///
/// `rows` must be non-empty; the pipeline skips publishing otherwise.
pub fn publish<T>(
    store: &T,
    project: &ProjectName,
    rows: &[MergedRow],
    run_stamp: &str,
) -> Result<PublishResult, SyncError>
where
    T: SheetStore + ?Sized,
{
    let tab_created = ensure_tab(store, &project.0)?;

    store.clear_range(&clear_range(&project.0))?;

    let values = build_values(rows, run_stamp);
    let range = data_range(&project.0, values.len());
    store.write_range(&range, values)?;

    tracing::info!("replaced {} rows in tab '{}'", rows.len(), project);
    Ok(PublishResult {
        tab_created,
        rows: rows.len(),
        range,
    })
}

/// Create the tab titled `title` unless it already exists. Returns `true` if created.
pub fn ensure_tab<T>(store: &T, title: &str) -> Result<bool, SyncError>
where
    T: SheetStore + ?Sized,
{
    if store.list_tabs()?.iter().any(|t| t == title) {
        return Ok(false);
    }
    store.add_tab(title)?;
    tracing::info!("created tab '{title}'");
    Ok(true)
}

/// Header row followed by one row per merged record, each stamped with `run_stamp`.
pub fn build_values(rows: &[MergedRow], run_stamp: &str) -> Vec<Vec<Value>> {
    let mut values = Vec::with_capacity(rows.len() + 1);
    values.push(HEADER.iter().map(|h| json!(h)).collect());
    for row in rows {
        values.push(vec![
            json!(run_stamp),
            json!(row.project),
            json!(row.unit_name),
            json!(row.status),
            number_cell(row.area),
            number_cell(row.price),
            json!(row.lock_date),
            json!(row.formalized_date),
            number_cell(row.amount_collected),
        ]);
    }
    values
}

/// Whole numbers go out as JSON integers so the sheet shows `45`, not `45.0`.
pub fn number_cell(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Run timestamp shown in the first column, `dd/mm/yyyy HH:MM:SS`.
pub fn format_run_stamp(at: &DateTime<FixedOffset>) -> String {
    at.format("%d/%m/%Y %H:%M:%S").to_string()
}

/// A1 tab reference: single-quoted, embedded quotes doubled.
pub fn quote_tab(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// `'<tab>'!A:I`: every row of the nine published columns.
pub fn clear_range(title: &str) -> String {
    format!("{}!A:{LAST_COLUMN}", quote_tab(title))
}

/// `'<tab>'!A1:I<rows>`: exactly the written region.
pub fn data_range(title: &str, rows: usize) -> String {
    format!("{}!A1:{LAST_COLUMN}{}", quote_tab(title), rows.max(1))
}

// ---------------------------------------------------------------------------
// Google Sheets v4 client
// ---------------------------------------------------------------------------

/// [`SheetStore`] over the Google Sheets v4 REST API with a bearer token.
pub struct SheetsClient {
    agent: ureq::Agent,
    base_url: String,
    spreadsheet_id: String,
    credential: Option<Credential>,
}

impl SheetsClient {
    pub fn new(config: &SheetsConfig, timeout: Duration) -> Self {
        Self {
            agent: http::agent(timeout),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            credential: config.credential.clone(),
        }
    }

    fn spreadsheet_url(&self, suffix: &str) -> String {
        format!("{}/spreadsheets/{}{suffix}", self.base_url, self.spreadsheet_id)
    }

    /// Resolve the bearer token. Token files are re-read on every call so an
    /// external refresher can rotate them while the daemon runs.
    fn bearer(&self) -> Result<String, SyncError> {
        let token = match &self.credential {
            None => {
                return Err(SyncError::Credential {
                    message: "no sheets credential configured".into(),
                })
            }
            Some(Credential::Token { token }) => token.trim().to_string(),
            Some(Credential::TokenFile { token_file }) => std::fs::read_to_string(token_file)
                .map_err(|e| SyncError::Credential {
                    message: format!("cannot read {}: {e}", token_file.display()),
                })?
                .trim()
                .to_string(),
        };
        if token.is_empty() {
            return Err(SyncError::Credential {
                message: "sheets token is empty".into(),
            });
        }
        Ok(format!("Bearer {token}"))
    }

    fn send(
        &self,
        operation: &'static str,
        request: ureq::Request,
        body: Option<&Value>,
    ) -> Result<ureq::Response, SyncError> {
        let request = request.set("Authorization", &self.bearer()?);
        http::call(request, body).map_err(|err| match err {
            CallError::Status { code, body } => SyncError::publish(
                operation,
                Some(code),
                format!("HTTP {code}: {}", http::error_message(&body)),
            ),
            CallError::Transport(message) => SyncError::publish(operation, None, message),
        })
    }
}

impl SheetStore for SheetsClient {
    fn list_tabs(&self) -> Result<Vec<String>, SyncError> {
        let request = self
            .agent
            .get(&self.spreadsheet_url(""))
            .query("fields", "sheets.properties.title");
        let body: Value = self
            .send("list_tabs", request, None)?
            .into_json()
            .map_err(|e| SyncError::publish("list_tabs", None, e.to_string()))?;

        Ok(body["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s["properties"]["title"].as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn add_tab(&self, title: &str) -> Result<(), SyncError> {
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        let request = self.agent.post(&self.spreadsheet_url(":batchUpdate"));
        self.send("add_tab", request, Some(&body))?;
        Ok(())
    }

    fn clear_range(&self, range: &str) -> Result<(), SyncError> {
        let body = json!({ "ranges": [range] });
        let request = self.agent.post(&self.spreadsheet_url("/values:batchClear"));
        self.send("clear", request, Some(&body))?;
        Ok(())
    }

    fn write_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SyncError> {
        let body = json!({
            "valueInputOption": "RAW",
            "data": [{ "range": range, "majorDimension": "ROWS", "values": rows }],
        });
        let request = self.agent.post(&self.spreadsheet_url("/values:batchUpdate"));
        self.send("write", request, Some(&body))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
