//! Error types for reda-sync.

use thiserror::Error;

use reda_core::error::ConfigError;

/// All errors that can arise while fetching, publishing, or orchestrating a run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A source endpoint answered with a non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Transport { url: String, status: u16 },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// The response body was not the JSON shape we expected.
    #[error("unexpected response body from {url}: {message}")]
    Decode { url: String, message: String },

    /// The destination spreadsheet rejected a call.
    #[error("sheet store rejected {operation}: {message}")]
    Publish {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    /// Bearer token for the spreadsheet API could not be resolved.
    #[error("sheet credential unavailable: {message}")]
    Credential { message: String },

    /// An error from configuration loading or validation.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A `--project` filter named a project that is not configured.
    #[error("project '{0}' is not configured")]
    UnknownProject(String),
}

impl SyncError {
    /// Convenience constructor for [`SyncError::Publish`].
    pub(crate) fn publish(
        operation: &'static str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        SyncError::Publish {
            operation,
            status,
            message: message.into(),
        }
    }
}
