use serde_json::Value;
use thiserror::Error;

use crate::types::ToolResult;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Request timed out")]
    Timeout,

    #[error("API request failed: {0}")]
    Connect(reqwest::Error),

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{}", api_display(.status, .body))]
    Api { status: u16, body: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ForwardError {
    /// Sorts a reqwest failure into timeout, connect or generic transport.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err)
        } else {
            Self::Http(err)
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Http(_) => "http",
            Self::Api { .. } => "api",
            Self::Config(_) => "config",
        }
    }

    pub fn into_tool_result(self) -> ToolResult {
        ToolResult::error(self.to_string())
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn api_display(status: &u16, body: &str) -> String {
    api_message(*status, body)
}

/// Picks a readable message out of a failed backend response: the `error`
/// field, then `message`, then the raw body, then the bare status.
pub fn api_message(status: u16, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let field = map
            .get("error")
            .filter(|v| !v.is_null())
            .or_else(|| map.get("message").filter(|v| !v.is_null()));
        if let Some(value) = field {
            return match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
        }
    }
    if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        body.to_string()
    }
}
