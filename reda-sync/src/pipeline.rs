//! Shared run entrypoint used by CLI and daemon.
//!
//! Projects are processed one at a time in configuration order. Each project is
//! its own failure boundary: an error is logged, recorded in the
//! [`RunSummary`], and the next project is attempted.

use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use reda_core::config::Config;
use reda_core::types::{MergedRow, ProjectRef};

use crate::error::SyncError;
use crate::fetch::{fetch_project, RedaClient, SourceApi};
use crate::publish::{self, SheetStore, SheetsClient};
use crate::reconcile::reconcile;

/// Knobs for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Restrict the run to one configured project (exact display name).
    pub project: Option<String>,
    /// Fetch and reconcile, but never touch the sheet store.
    pub dry_run: bool,
}

/// What happened to one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectOutcome {
    /// Tab replaced with `rows` data rows.
    Published { rows: usize, tab_created: bool },
    /// Dry run: `rows` data rows would have been written.
    WouldPublish { rows: usize },
    /// Inventory was empty; the store was not called.
    Empty,
    /// Fetch or publish failed; the tab was left as it was (or partially
    /// cleared, if the write itself failed).
    Failed { error: String },
}

/// Per-project line of a [`RunSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub project: String,
    pub outcome: ProjectOutcome,
    pub duration_ms: u64,
}

/// Outcome of one full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<FixedOffset>,
    pub dry_run: bool,
    pub projects: Vec<ProjectReport>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ProjectOutcome::Failed { .. }))
    }

    pub fn published(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                ProjectOutcome::Published { .. } | ProjectOutcome::WouldPublish { .. }
            )
        })
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, ProjectOutcome::Empty))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&ProjectOutcome) -> bool) -> usize {
        self.projects.iter().filter(|p| pred(&p.outcome)).count()
    }
}

/// Run against the live REDA API and Google Sheets.
///
/// This is the canonical entrypoint for both `reda-sync run` and the daemon.
/// Validates `config` first; a config error fails the whole run.
pub fn run(config: &Config, options: &RunOptions) -> Result<RunSummary, SyncError> {
    config.validate()?;
    let timeout = Duration::from_secs(config.api.timeout_secs);
    let source = RedaClient::new(&config.api);
    let store = SheetsClient::new(&config.sheets, timeout);
    run_once(config, &source, &store, options)
}

/// Run every selected project through fetch → reconcile → publish.
pub fn run_once<S, T>(
    config: &Config,
    source: &S,
    store: &T,
    options: &RunOptions,
) -> Result<RunSummary, SyncError>
where
    S: SourceApi + ?Sized,
    T: SheetStore + ?Sized,
{
    let started_at = Utc::now().with_timezone(&config.report_offset());
    run_once_at(config, source, store, options, started_at)
}

pub(crate) fn run_once_at<S, T>(
    config: &Config,
    source: &S,
    store: &T,
    options: &RunOptions,
    started_at: DateTime<FixedOffset>,
) -> Result<RunSummary, SyncError>
where
    S: SourceApi + ?Sized,
    T: SheetStore + ?Sized,
{
    let projects = select_projects(config, options.project.as_deref())?;
    let run_stamp = publish::format_run_stamp(&started_at);
    let run_started = Instant::now();

    let mut reports = Vec::with_capacity(projects.len());
    for project in projects {
        tracing::info!("processing project: {}", project.name);
        let started = Instant::now();

        let outcome = match sync_project(source, store, project, &run_stamp, options.dry_run) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("project '{}' failed: {err}", project.name);
                ProjectOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        reports.push(ProjectReport {
            project: project.name.0.clone(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    let summary = RunSummary {
        started_at,
        dry_run: options.dry_run,
        projects: reports,
        duration_ms: run_started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        "run finished: {} published, {} empty, {} failed",
        summary.published(),
        summary.empty(),
        summary.failed()
    );
    Ok(summary)
}

/// Fetch and reconcile one project without publishing.
pub fn preview<S>(config: &Config, source: &S, project: &str) -> Result<Vec<MergedRow>, SyncError>
where
    S: SourceApi + ?Sized,
{
    let project = config
        .project(project)
        .ok_or_else(|| SyncError::UnknownProject(project.to_string()))?;
    let data = fetch_project(source, project)?;
    Ok(reconcile(&project.name, &data.inventory, &data.funding))
}

fn sync_project<S, T>(
    source: &S,
    store: &T,
    project: &ProjectRef,
    run_stamp: &str,
    dry_run: bool,
) -> Result<ProjectOutcome, SyncError>
where
    S: SourceApi + ?Sized,
    T: SheetStore + ?Sized,
{
    let data = fetch_project(source, project)?;
    let rows = reconcile(&project.name, &data.inventory, &data.funding);

    if rows.is_empty() {
        tracing::info!("project '{}' has no inventory; skipping publish", project.name);
        return Ok(ProjectOutcome::Empty);
    }
    if dry_run {
        tracing::info!("[dry-run] would replace {} rows in '{}'", rows.len(), project.name);
        return Ok(ProjectOutcome::WouldPublish { rows: rows.len() });
    }

    let result = publish::publish(store, &project.name, &rows, run_stamp)?;
    Ok(ProjectOutcome::Published {
        rows: result.rows,
        tab_created: result.tab_created,
    })
}

fn select_projects<'a>(
    config: &'a Config,
    only: Option<&str>,
) -> Result<Vec<&'a ProjectRef>, SyncError> {
    match only {
        None => Ok(config.projects.iter().collect()),
        Some(name) => config
            .project(name)
            .map(|p| vec![p])
            .ok_or_else(|| SyncError::UnknownProject(name.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
