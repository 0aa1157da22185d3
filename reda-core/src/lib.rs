//! reda-core: domain types, configuration persistence, errors.
//!
//! Public API surface:
//! - [`types`]: project references, wire records, merged rows
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init / validate

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{
    DisplayDate, FundingRecord, InventoryRecord, MergedRow, ProjectName, ProjectRef,
};
