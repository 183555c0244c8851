use serde_json::json;

use crate::types::{Category, ToolAnnotations, ToolDescriptor};

pub const GET_TOOLS_IN_CATEGORY: &str = "get_tools_in_category";
pub const EXECUTE_TOOL: &str = "execute_tool";

pub fn is_meta_tool(name: &str) -> bool {
    name == GET_TOOLS_IN_CATEGORY || name == EXECUTE_TOOL
}

/// Descriptors of the two discovery tools shown in lazy mode. The category
/// list in the browse description follows the loaded catalog.
pub fn meta_tools(categories: &[Category]) -> Vec<ToolDescriptor> {
    let keys = categories
        .iter()
        .map(|c| c.key.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        ToolDescriptor {
            name: GET_TOOLS_IN_CATEGORY.to_string(),
            description: format!(
                "Browse available SerialMemory tools by category. Call with no path for root categories. Categories: {keys}."
            ),
            annotations: Some(ToolAnnotations::read_only()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Category path (empty for root, e.g. 'lifecycle', 'safety')"
                    }
                }
            }),
        },
        ToolDescriptor {
            name: EXECUTE_TOOL.to_string(),
            description: "Execute a SerialMemory tool by its category path. Use get_tools_in_category first to discover tools and their parameters.".to_string(),
            annotations: None,
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tool_path": {
                        "type": "string",
                        "description": "Tool path (e.g. 'lifecycle.memory_update', 'safety.detect_contradictions')"
                    },
                    "arguments": {
                        "type": "object",
                        "description": "Tool arguments as JSON object"
                    }
                },
                "required": ["tool_path"]
            }),
        },
    ]
}
