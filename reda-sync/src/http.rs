//! Thin helpers over `ureq` shared by the source and sheet clients.

use std::time::Duration;

use serde_json::Value;

/// Longest slice of a non-JSON error body kept in messages.
const MAX_BODY_IN_MESSAGE: usize = 200;

/// Failure of one HTTP call, before the caller maps it to a [`crate::SyncError`].
#[derive(Debug)]
pub(crate) enum CallError {
    /// The server answered with a non-2xx status.
    Status { code: u16, body: String },
    /// No response: connect/DNS/TLS failure or timeout.
    Transport(String),
}

/// Build an agent whose every request is bounded by `timeout`.
pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// Execute `request`, optionally with a JSON body.
pub(crate) fn call(request: ureq::Request, body: Option<&Value>) -> Result<ureq::Response, CallError> {
    let result = match body {
        Some(json) => request.send_json(json.clone()),
        None => request.call(),
    };
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(code, response)) => Err(CallError::Status {
            code,
            body: response.into_string().unwrap_or_default(),
        }),
        Err(ureq::Error::Transport(transport)) => Err(CallError::Transport(transport.to_string())),
    }
}

/// Best human-readable message from an error body.
///
/// Google APIs wrap errors as `{"error": {"message": "..."}}`; anything else
/// is returned trimmed and shortened.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = json["error"]["message"].as_str() {
            return message.to_string();
        }
        if let Some(message) = json["message"].as_str() {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_BODY_IN_MESSAGE).collect()
}
