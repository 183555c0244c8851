use std::sync::Arc;

use serde_json::{json, Value};
use serialmemory_catalog::{Catalog, Route, EXECUTE_TOOL, GET_TOOLS_IN_CATEGORY};
use serialmemory_forward::{Backend, ToolResult};
use tracing::{debug, info};

use crate::meta;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, Method, Outcome, PROTOCOL_VERSION};

pub const SERVER_NAME: &str = "serialmemory-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    Full,
    Lazy,
}

/// Where a `tools/call` name leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolHandler {
    GetToolsInCategory,
    ExecuteTool,
    Forward(Route),
}

/// Stateless JSON-RPC dispatcher shared by the stdio and HTTP transports.
pub struct McpServer {
    catalog: Arc<Catalog>,
    backend: Arc<dyn Backend>,
    mode: CatalogMode,
}

impl McpServer {
    pub fn new(catalog: Arc<Catalog>, backend: Arc<dyn Backend>, mode: CatalogMode) -> Self {
        Self {
            catalog,
            backend,
            mode,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn mode(&self) -> CatalogMode {
        self.mode
    }

    pub async fn handle_message(&self, raw: &str) -> Result<Outcome, serde_json::Error> {
        let request: JsonRpcRequest = serde_json::from_str(raw)?;
        Ok(self.handle_request(request).await)
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Outcome {
        info!(method = %request.method, "mcp request");
        let id = request.id.unwrap_or(Value::Null);

        let result = match Method::parse(&request.method) {
            Method::Initialize => initialize_result(),
            Method::Initialized | Method::Shutdown => return Outcome::Silent,
            Method::Exit => return Outcome::Exit,
            Method::ToolsList => self.tools_list(),
            Method::ResourcesList => resources_list(),
            Method::ResourcesRead => self
                .backend
                .forward(&Route::post("resources/read"), Some(&request.params))
                .await
                .into_value(),
            Method::ToolsCall => self.call_tool(&request.params).await.into_value(),
            Method::Unknown(method) => {
                debug!(%method, "ignoring unknown method");
                return Outcome::Silent;
            }
        };

        Outcome::Reply(JsonRpcResponse::success(id, result))
    }

    pub fn tools_list(&self) -> Value {
        match self.mode {
            CatalogMode::Full => json!({ "tools": self.catalog.list_all() }),
            CatalogMode::Lazy => json!({ "tools": self.catalog.list_lazy() }),
        }
    }

    /// Meta-tools are served locally in either listing mode.
    pub fn resolve_tool(&self, name: &str) -> Option<ToolHandler> {
        match name {
            GET_TOOLS_IN_CATEGORY => Some(ToolHandler::GetToolsInCategory),
            EXECUTE_TOOL => Some(ToolHandler::ExecuteTool),
            _ => self.catalog.route(name).cloned().map(ToolHandler::Forward),
        }
    }

    pub async fn call_tool(&self, params: &Value) -> ToolResult {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.is_empty() {
            return ToolResult::error("Tool name is required");
        }
        let arguments = params.get("arguments");
        info!(tool = %name, "tools/call");

        match self.resolve_tool(name) {
            Some(ToolHandler::GetToolsInCategory) => meta::browse(&self.catalog, arguments),
            Some(ToolHandler::ExecuteTool) => self.execute_tool(arguments).await,
            Some(ToolHandler::Forward(route)) => self.backend.forward(&route, arguments).await,
            None => ToolResult::error(format!("Unknown tool: {name}")),
        }
    }

    async fn execute_tool(&self, arguments: Option<&Value>) -> ToolResult {
        let tool_path = arguments
            .and_then(|args| args.get("tool_path"))
            .and_then(Value::as_str)
            .map(|raw| raw.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if tool_path.is_empty() {
            return ToolResult::error("tool_path is required (e.g. 'lifecycle.memory_update')");
        }

        let Some(tool) = self.catalog.resolve_tool_path(&tool_path) else {
            return ToolResult::error(format!(
                "Unknown tool path: {tool_path}. Use get_tools_in_category to discover available tools."
            ));
        };
        let Some(route) = self.catalog.route(tool) else {
            return ToolResult::error(format!("No API route for tool: {tool}"));
        };

        info!(path = %tool_path, %tool, "execute_tool");
        let nested = arguments.and_then(|args| args.get("arguments"));
        self.backend.forward(route, nested).await
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
        "capabilities": {
            "tools": { "listChanged": true },
            "resources": { "listChanged": true }
        }
    })
}

fn resources_list() -> Value {
    json!({
        "resources": [
            { "uri": "memory://recent", "name": "Recent Memories", "mimeType": "application/json" },
            { "uri": "memory://sessions", "name": "Conversation Sessions", "mimeType": "application/json" }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use support::RecordingBackend;

    mod support {
        use std::sync::Mutex;

        use async_trait::async_trait;
        use serde_json::Value;
        use serialmemory_catalog::Route;
        use serialmemory_forward::{Backend, ToolResult};

        #[derive(Default)]
        pub struct RecordingBackend {
            pub calls: Mutex<Vec<(Route, Option<Value>)>>,
        }

        #[async_trait]
        impl Backend for RecordingBackend {
            async fn forward(&self, route: &Route, payload: Option<&Value>) -> ToolResult {
                if let Ok(mut calls) = self.calls.lock() {
                    calls.push((route.clone(), payload.cloned()));
                }
                ToolResult::text(format!("{} {}", route.verb.as_str(), route.path))
            }
        }
    }

    fn server(mode: CatalogMode) -> (McpServer, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let catalog = Arc::new(Catalog::builtin().expect("embedded catalog"));
        let server = McpServer::new(catalog, backend.clone(), mode);
        (server, backend)
    }

    fn reply(outcome: Outcome) -> JsonRpcResponse {
        match outcome {
            Outcome::Reply(response) => response,
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn resolves_meta_tools_and_routes() {
        let (server, _) = server(CatalogMode::Full);
        assert_eq!(
            server.resolve_tool("get_tools_in_category"),
            Some(ToolHandler::GetToolsInCategory)
        );
        assert_eq!(server.resolve_tool("execute_tool"), Some(ToolHandler::ExecuteTool));
        assert_eq!(
            server.resolve_tool("memory_search"),
            Some(ToolHandler::Forward(Route::get("memories/search")))
        );
        assert_eq!(server.resolve_tool("bogus_tool"), None);
    }

    #[tokio::test]
    async fn missing_tool_name_is_a_tool_error() {
        let (server, backend) = server(CatalogMode::Lazy);
        let result = server.call_tool(&json!({"arguments": {}})).await;
        assert!(result.is_error());
        assert_eq!(result.first_text(), Some("Error: Tool name is required"));
        let calls = backend.calls.lock().expect("calls");
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn execute_tool_forwards_nested_arguments() {
        let (server, backend) = server(CatalogMode::Lazy);
        let result = server
            .call_tool(&json!({
                "name": "execute_tool",
                "arguments": {
                    "tool_path": " Lifecycle.Memory_Update ",
                    "arguments": {"memory_id": "m-1"}
                }
            }))
            .await;
        assert_eq!(result.first_text(), Some("POST power/memory/update"));
        let calls = backend.calls.lock().expect("calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, Some(json!({"memory_id": "m-1"})));
    }

    #[tokio::test]
    async fn execute_tool_validates_path() {
        let (server, _) = server(CatalogMode::Lazy);
        let missing = server
            .call_tool(&json!({"name": "execute_tool", "arguments": {}}))
            .await;
        assert_eq!(
            missing.first_text(),
            Some("Error: tool_path is required (e.g. 'lifecycle.memory_update')")
        );
        let unknown = server
            .call_tool(&json!({"name": "execute_tool", "arguments": {"tool_path": "safety.nope"}}))
            .await;
        assert_eq!(
            unknown.first_text(),
            Some("Error: Unknown tool path: safety.nope. Use get_tools_in_category to discover available tools.")
        );
    }

    #[tokio::test]
    async fn silent_and_exit_methods_produce_no_reply() {
        let (server, _) = server(CatalogMode::Lazy);
        for method in ["notifications/initialized", "shutdown", "prompts/list"] {
            let outcome = server
                .handle_request(JsonRpcRequest::new(json!(1), method, Value::Null))
                .await;
            assert!(matches!(outcome, Outcome::Silent), "{method}");
        }
        let outcome = server
            .handle_request(JsonRpcRequest::new(json!(2), "exit", Value::Null))
            .await;
        assert!(matches!(outcome, Outcome::Exit));
    }

    #[tokio::test]
    async fn initialize_reports_fixed_protocol_version() {
        let (server, _) = server(CatalogMode::Full);
        let response = reply(
            server
                .handle_message(r#"{"jsonrpc":"2.0","id":"init","method":"initialize"}"#)
                .await
                .expect("valid json"),
        );
        assert_eq!(response.id, json!("init"));
        let result = response.result.expect("result");
        assert_eq!(result["protocolVersion"], json!("2024-11-05"));
        assert_eq!(result["serverInfo"]["name"], json!("serialmemory-mcp"));
        assert_eq!(result["capabilities"]["resources"]["listChanged"], json!(true));
    }

    #[tokio::test]
    async fn resources_read_forwards_params() {
        let (server, backend) = server(CatalogMode::Full);
        let response = reply(
            server
                .handle_request(JsonRpcRequest::new(
                    json!(5),
                    "resources/read",
                    json!({"uri": "memory://recent"}),
                ))
                .await,
        );
        assert_eq!(
            response.result.expect("result")["content"][0]["text"],
            json!("POST resources/read")
        );
        let calls = backend.calls.lock().expect("calls");
        assert_eq!(calls[0].1, Some(json!({"uri": "memory://recent"})));
    }
}
