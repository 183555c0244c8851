use std::io;

use serialmemory_catalog::CatalogError;
use serialmemory_forward::ForwardError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::tls::TlsError;

/// Anything that stops the process before or while a transport is running.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to load tool catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to build api forwarder: {0}")]
    Forward(#[from] ForwardError),

    #[error("failed to set up https: {0}")]
    Tls(#[from] TlsError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
