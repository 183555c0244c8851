use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Url};
use serde_json::{Value, json};
use serialmemory_catalog::{Route, Verb};
use tracing::{debug, error, warn};

use crate::config::ForwarderConfig;
use crate::error::ForwardError;
use crate::query::encode_query;
use crate::traits::Backend;
use crate::types::ToolResult;

/// Forwards tool calls to `{endpoint}/api/{route}` over one pooled client.
#[derive(Clone)]
pub struct ApiForwarder {
    config: ForwarderConfig,
    client: Client,
}

impl ApiForwarder {
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        if config.endpoint.trim().is_empty() {
            return Err(ForwardError::Config("endpoint is empty".to_string()));
        }
        Url::parse(&config.endpoint)
            .map_err(|err| ForwardError::Config(format!("invalid endpoint {}: {err}", config.endpoint)))?;
        if config.api_key.trim().is_empty() {
            return Err(ForwardError::Config("api key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/{}",
            self.config.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn build_request(&self, route: &Route, payload: Option<&Value>) -> RequestBuilder {
        let url = self.url(&route.path);
        let request = match route.verb {
            Verb::Get => {
                let query = payload.map(encode_query).unwrap_or_default();
                let url = if query.is_empty() {
                    url
                } else {
                    format!("{url}?{query}")
                };
                debug!(%url, "GET");
                self.client.get(url)
            }
            Verb::Post => {
                debug!(%url, "POST");
                match payload.filter(|value| !value.is_null()) {
                    Some(body) => self.client.post(url).json(body),
                    None => self.client.post(url).json(&json!({})),
                }
            }
        };
        request.bearer_auth(&self.config.api_key)
    }

    async fn send(&self, route: &Route, payload: Option<&Value>) -> Result<ToolResult, ForwardError> {
        let response = self
            .build_request(route, payload)
            .send()
            .await
            .map_err(ForwardError::from_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ForwardError::from_transport)?;

        if !status.is_success() {
            return Err(ForwardError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(wrap_success(body))
    }
}

#[async_trait::async_trait]
impl Backend for ApiForwarder {
    async fn forward(&self, route: &Route, payload: Option<&Value>) -> ToolResult {
        match self.send(route, payload).await {
            Ok(result) => result,
            Err(err) => {
                match &err {
                    ForwardError::Timeout | ForwardError::Api { .. } => {
                        warn!(category = err.category(), path = %route.path, error = %err, "backend call failed");
                    }
                    _ => {
                        error!(category = err.category(), path = %route.path, error = %err, "backend call failed");
                    }
                }
                err.into_tool_result()
            }
        }
    }
}

/// A 2xx body that is already an MCP result passes through; anything else is
/// wrapped as a single text item.
pub fn wrap_success(body: String) -> ToolResult {
    match serde_json::from_str::<Value>(&body) {
        Ok(value @ Value::Object(_))
            if value.get("content").is_some_and(|content| !content.is_null()) =>
        {
            ToolResult::Passthrough(value)
        }
        _ => ToolResult::text(body),
    }
}
