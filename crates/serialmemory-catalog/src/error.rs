use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("tool {0} has no backend route")]
    MissingRoute(String),

    #[error("tool {0} reuses a reserved meta-tool name")]
    ReservedName(String),

    #[error("invalid category key: {0:?}")]
    InvalidCategoryKey(String),

    #[error("duplicate category key: {0}")]
    DuplicateCategory(String),

    #[error("category {category} references unknown tool {tool}")]
    UnknownCategoryTool { category: String, tool: String },

    #[error("tool {tool} is listed in both {first} and {second}")]
    ToolInTwoCategories {
        tool: String,
        first: String,
        second: String,
    },

    #[error("lazy core references unknown tool {0}")]
    UnknownLazyTool(String),
}
