pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod meta;
pub mod protocol;
pub mod server;
pub mod stdio;
pub mod tls;

pub use config::{Config, ConfigError, TlsPaths};
pub use error::StartupError;
pub use http::HttpServer;
pub use server::{CatalogMode, McpServer, ToolHandler};
pub use stdio::{serve_stdio, StdioExit};
pub use tls::TlsError;
