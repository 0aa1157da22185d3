//! # reda-sync
//!
//! Fetch, reconcile, and publish pipeline.
//!
//! Call [`pipeline::run`] to process every configured project against the live
//! APIs, or [`pipeline::run_once`] to drive the same flow through any
//! [`SourceApi`] / [`SheetStore`] pair.

pub mod error;
pub mod fetch;
mod http;
pub mod pipeline;
pub mod publish;
pub mod reconcile;

pub use error::SyncError;
pub use fetch::{fetch_project, ProjectData, RedaClient, SourceApi};
pub use pipeline::{ProjectOutcome, ProjectReport, RunOptions, RunSummary};
pub use publish::{PublishResult, SheetStore, SheetsClient};
pub use reconcile::{format_date, normalize_key, reconcile};
