use async_trait::async_trait;
use serde_json::Value;
use serialmemory_catalog::Route;

use crate::types::ToolResult;

/// Executes one tool call against the SerialMemory API. Failures are folded
/// into the returned envelope, so callers never see a transport error.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn forward(&self, route: &Route, payload: Option<&Value>) -> ToolResult;
}
