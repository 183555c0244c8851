use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    pub content: Vec<TextContent>,
}

/// Outcome of a tool call in MCP shape. A backend body that already carries
/// `content` is kept verbatim so its key order survives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResult {
    Envelope(ToolEnvelope),
    Passthrough(Value),
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Envelope(ToolEnvelope {
            is_error: None,
            content: vec![TextContent::new(text)],
        })
    }

    /// Error envelope; the text is prefixed with `Error: `.
    pub fn error(message: impl AsRef<str>) -> Self {
        Self::Envelope(ToolEnvelope {
            is_error: Some(true),
            content: vec![TextContent::new(format!("Error: {}", message.as_ref()))],
        })
    }

    pub fn is_error(&self) -> bool {
        match self {
            Self::Envelope(envelope) => envelope.is_error.unwrap_or(false),
            Self::Passthrough(value) => value
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }

    pub fn first_text(&self) -> Option<&str> {
        match self {
            Self::Envelope(envelope) => envelope.content.first().map(|c| c.text.as_str()),
            Self::Passthrough(value) => value
                .get("content")
                .and_then(Value::as_array)
                .and_then(|items| items.first())
                .and_then(|item| item.get("text"))
                .and_then(Value::as_str),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Envelope(envelope) => serde_json::to_value(envelope).unwrap_or(Value::Null),
            Self::Passthrough(value) => value,
        }
    }
}
