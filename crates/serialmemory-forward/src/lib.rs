pub mod config;
pub mod error;
pub mod forwarder;
pub mod query;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::ForwardError;
pub use forwarder::ApiForwarder;
pub use query::encode_query;
pub use traits::*;
pub use types::*;
