pub mod catalog;
pub mod error;
pub mod meta;
pub mod types;

pub use catalog::*;
pub use error::CatalogError;
pub use meta::{is_meta_tool, EXECUTE_TOOL, GET_TOOLS_IN_CATEGORY};
pub use types::*;
