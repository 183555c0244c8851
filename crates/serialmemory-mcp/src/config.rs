use std::fmt;
use std::path::{Path, PathBuf};

use serialmemory_catalog::{Catalog, CatalogError};
use serialmemory_forward::ForwarderConfig;
use thiserror::Error;

use crate::server::CatalogMode;

pub const ENDPOINT_VAR: &str = "SERIALMEMORY_ENDPOINT";
pub const API_KEY_VAR: &str = "SERIALMEMORY_API_KEY";
pub const LAZY_VAR: &str = "SERIALMEMORY_LAZY_MCP";
pub const TOKEN_VAR: &str = "SERIALMEMORY_MCP_TOKEN";
pub const HTTP_ADDR_VAR: &str = "SERIALMEMORY_HTTP_ADDR";
pub const CATALOG_PATH_VAR: &str = "SERIALMEMORY_CATALOG_PATH";
pub const LOG_VAR: &str = "SERIALMEMORY_LOG";
pub const HTTPS_ADDR_VAR: &str = "SERIALMEMORY_HTTPS_ADDR";
pub const TLS_CERT_VAR: &str = "SERIALMEMORY_TLS_CERT";
pub const TLS_KEY_VAR: &str = "SERIALMEMORY_TLS_KEY";

pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:4545";
pub const CONTAINER_HTTP_ADDR: &str = "0.0.0.0:4545";
pub const DEFAULT_HTTPS_ADDR: &str = "127.0.0.1:4546";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SERIALMEMORY_ENDPOINT is required (e.g., https://api.serialmemory.dev)")]
    MissingEndpoint,

    #[error("SERIALMEMORY_API_KEY is required")]
    MissingApiKey,

    #[error("SERIALMEMORY_TLS_CERT and SERIALMEMORY_TLS_KEY must be set together")]
    IncompleteTls,
}

/// PEM files for the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub endpoint: String,
    pub api_key: String,
    pub lazy: bool,
    pub mcp_token: Option<String>,
    pub http_addr: String,
    pub https_addr: String,
    pub tls: Option<TlsPaths>,
    pub catalog_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Config {
    pub fn from_env(container: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), container)
    }

    pub fn from_lookup<F>(lookup: F, container: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let endpoint = non_empty(ENDPOINT_VAR)
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingEndpoint)?;
        let api_key = non_empty(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;
        let lazy = non_empty(LAZY_VAR).map_or(true, |value| parse_toggle(&value));
        let tls = match (non_empty(TLS_CERT_VAR), non_empty(TLS_KEY_VAR)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };
        let default_addr = if container {
            CONTAINER_HTTP_ADDR
        } else {
            DEFAULT_HTTP_ADDR
        };

        Ok(Self {
            endpoint,
            api_key,
            lazy,
            mcp_token: non_empty(TOKEN_VAR),
            http_addr: non_empty(HTTP_ADDR_VAR).unwrap_or_else(|| default_addr.to_string()),
            https_addr: non_empty(HTTPS_ADDR_VAR).unwrap_or_else(|| DEFAULT_HTTPS_ADDR.to_string()),
            tls,
            catalog_path: non_empty(CATALOG_PATH_VAR).map(PathBuf::from),
            log_filter: non_empty(LOG_VAR).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    pub fn catalog_mode(&self) -> CatalogMode {
        if self.lazy {
            CatalogMode::Lazy
        } else {
            CatalogMode::Full
        }
    }

    /// Certificate and key for the loopback HTTPS listener. Container mode
    /// serves plain HTTP only.
    pub fn https(&self, container: bool) -> Option<(&Path, &Path)> {
        if container {
            return None;
        }
        self.tls
            .as_ref()
            .map(|paths| (paths.cert.as_path(), paths.key.as_path()))
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig::new(self.endpoint.clone(), self.api_key.clone())
    }

    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => Catalog::from_path(path),
            None => Catalog::builtin(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("lazy", &self.lazy)
            .field("mcp_token", &self.mcp_token.as_ref().map(|_| "<redacted>"))
            .field("http_addr", &self.http_addr)
            .field("https_addr", &self.https_addr)
            .field("tls", &self.tls)
            .field("catalog_path", &self.catalog_path)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

fn parse_toggle(raw: &str) -> bool {
    !matches!(
        raw.to_ascii_lowercase().as_str(),
        "0" | "false" | "off" | "no"
    )
}
