use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::CatalogError;
use crate::meta::{is_meta_tool, meta_tools};
use crate::types::{Category, Route, ToolAnnotations, ToolDescriptor};

pub const BUILTIN_CATALOG_JSON: &str = include_str!("../data/catalog.json");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    lazy_core: Vec<String>,
    #[serde(default)]
    categories: Vec<CategoryEntry>,
    tools: Vec<ToolEntry>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    key: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    annotations: Option<ToolAnnotations>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    input_schema: Value,
    #[serde(default)]
    route: Option<Route>,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Immutable tool table. Both the full and the lazy listing read from the
/// same route table, keyed by tool name.
#[derive(Debug, Clone)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
    routes: HashMap<String, Route>,
    categories: Vec<Category>,
    category_members: HashMap<String, Vec<usize>>,
    tool_paths: HashMap<String, String>,
    lazy_core: HashSet<String>,
    meta: Vec<ToolDescriptor>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG_JSON)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Self::build(file)
    }

    fn build(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut tools = Vec::with_capacity(file.tools.len());
        let mut by_name = HashMap::with_capacity(file.tools.len());
        let mut routes = HashMap::with_capacity(file.tools.len());

        for entry in file.tools {
            if is_meta_tool(&entry.name) {
                return Err(CatalogError::ReservedName(entry.name));
            }
            if by_name.contains_key(&entry.name) {
                return Err(CatalogError::DuplicateTool(entry.name));
            }
            let Some(route) = entry.route else {
                return Err(CatalogError::MissingRoute(entry.name));
            };
            by_name.insert(entry.name.clone(), tools.len());
            routes.insert(entry.name.clone(), route);
            tools.push(ToolDescriptor {
                name: entry.name,
                description: entry.description,
                annotations: entry.annotations,
                input_schema: entry.input_schema,
            });
        }

        let mut categories = Vec::with_capacity(file.categories.len());
        let mut category_members: HashMap<String, Vec<usize>> = HashMap::new();
        let mut tool_paths = HashMap::new();
        let mut owner: HashMap<String, String> = HashMap::new();

        for entry in file.categories {
            if !is_slug(&entry.key) {
                return Err(CatalogError::InvalidCategoryKey(entry.key));
            }
            if category_members.contains_key(&entry.key) {
                return Err(CatalogError::DuplicateCategory(entry.key));
            }
            let mut members = Vec::with_capacity(entry.tools.len());
            for tool in entry.tools {
                let Some(&index) = by_name.get(&tool) else {
                    return Err(CatalogError::UnknownCategoryTool {
                        category: entry.key,
                        tool,
                    });
                };
                if let Some(first) = owner.get(&tool) {
                    return Err(CatalogError::ToolInTwoCategories {
                        tool,
                        first: first.clone(),
                        second: entry.key,
                    });
                }
                owner.insert(tool.clone(), entry.key.clone());
                tool_paths.insert(
                    format!("{}.{}", entry.key, tool.to_ascii_lowercase()),
                    tool,
                );
                members.push(index);
            }
            category_members.insert(entry.key.clone(), members);
            categories.push(Category {
                key: entry.key,
                title: entry.title,
                description: entry.description,
            });
        }

        let mut lazy_core = HashSet::with_capacity(file.lazy_core.len());
        for name in file.lazy_core {
            if !by_name.contains_key(&name) {
                return Err(CatalogError::UnknownLazyTool(name));
            }
            lazy_core.insert(name);
        }

        let meta = meta_tools(&categories);
        Ok(Self {
            tools,
            by_name,
            routes,
            categories,
            category_members,
            tool_paths,
            lazy_core,
            meta,
        })
    }

    pub fn list_all(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn list_lazy(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .filter(|tool| self.lazy_core.contains(&tool.name))
            .chain(self.meta.iter())
            .cloned()
            .collect()
    }

    pub fn meta_tools(&self) -> &[ToolDescriptor] {
        &self.meta
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, key: &str) -> Option<&Category> {
        let key = normalize(key);
        self.categories.iter().find(|category| category.key == key)
    }

    pub fn tools_for_category(&self, key: &str) -> Vec<&ToolDescriptor> {
        self.category_members
            .get(&normalize(key))
            .map(|members| {
                members
                    .iter()
                    .filter_map(|&index| self.tools.get(index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolves `category.tool` to a tool name. Matching ignores case and
    /// surrounding whitespace.
    pub fn resolve_tool_path(&self, path: &str) -> Option<&str> {
        self.tool_paths.get(&normalize(path)).map(String::as_str)
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name
            .get(name)
            .and_then(|&index| self.tools.get(index))
    }

    pub fn is_lazy_core(&self, name: &str) -> bool {
        self.lazy_core.contains(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn is_slug(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
