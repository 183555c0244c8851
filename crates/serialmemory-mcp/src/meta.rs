use serde_json::Value;
use serialmemory_catalog::{Catalog, EXECUTE_TOOL, GET_TOOLS_IN_CATEGORY};
use serialmemory_forward::ToolResult;

/// Handles `get_tools_in_category`. An empty path lists the categories, a
/// known key lists its tools with their schemas.
pub fn browse(catalog: &Catalog, arguments: Option<&Value>) -> ToolResult {
    let path = arguments
        .and_then(|args| args.get("path"))
        .and_then(Value::as_str)
        .map(|raw| raw.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if path.is_empty() {
        return ToolResult::text(category_index(catalog));
    }

    let Some(category) = catalog.category(&path) else {
        let available = catalog
            .categories()
            .iter()
            .map(|c| c.key.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return ToolResult::error(format!("Unknown category: {path}. Available: {available}"));
    };

    let tools = catalog.tools_for_category(&path);
    let listing = serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string());
    ToolResult::text(format!(
        "## {}\n{}\n\n**{} tools available.** Use `{EXECUTE_TOOL}` with path `{path}.<tool_name>` to execute.\n\n{listing}",
        category.title,
        category.description,
        tools.len(),
    ))
}

pub fn category_index(catalog: &Catalog) -> String {
    let mut text = String::from("## SerialMemory Tool Categories\n\n");
    for category in catalog.categories() {
        let count = catalog.tools_for_category(&category.key).len();
        text.push_str(&format!(
            "- **{}** ({count} tools) - {}\n",
            category.key, category.description
        ));
    }
    text.push_str(&format!(
        "\nUse `{GET_TOOLS_IN_CATEGORY}` with a category name to see available tools."
    ));
    text
}
