use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ForwarderConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

pub fn default_user_agent() -> String {
    format!("SerialMemory-MCP/{}", env!("CARGO_PKG_VERSION"))
}
