//! HTTP Tool Server
//!
//! `ToolEndpoint` over a tool server's HTTP API:
//! `GET {base}/health`, `GET {base}{prefix}/tools`,
//! `POST {base}{prefix}/invoke {name, arguments}`.

use std::time::Duration;

use agent_core::error::{AgentError, Result};
use agent_core::tool::{ToolDescriptor, ToolEndpoint};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

/// Route prefix used by the deployed tool servers
pub const DEFAULT_PREFIX: &str = "/mcp";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct InvokeRequest<'a> {
    name: &'a str,
    arguments: &'a Map<String, Value>,
}

/// One remote tool server
#[derive(Clone, Debug)]
pub struct HttpToolServer {
    base_url: String,
    prefix: String,
    client: reqwest::Client,
}

impl HttpToolServer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Share a client (and its connection pool) across servers
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            prefix: DEFAULT_PREFIX.into(),
            client,
        }
    }

    /// Route prefix for `/tools` and `/invoke`; `""` for bare paths
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    fn route(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.prefix, path)
    }
}

#[async_trait]
impl ToolEndpoint for HttpToolServer {
    fn url(&self) -> &str {
        &self.base_url
    }

    async fn health(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(r) if r.status() == StatusCode::OK => true,
            Ok(r) => {
                tracing::debug!(endpoint = %self.base_url, status = %r.status(), "Unhealthy");
                false
            }
            Err(e) => {
                tracing::debug!(endpoint = %self.base_url, "Health probe failed: {}", e);
                false
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let response = self
            .client
            .get(self.route("/tools"))
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{}: {e}", self.base_url)))?;

        if response.status() != StatusCode::OK {
            return Err(AgentError::ToolExecution(format!(
                "{}: failed to fetch tools: {}",
                self.base_url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{}: invalid tool catalog: {e}", self.base_url)))
    }

    async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        let response = self
            .client
            .post(self.route("/invoke"))
            .json(&InvokeRequest { name, arguments: args })
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{}: {e}", self.base_url)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AgentError::ToolNotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::ToolExecution(format!(
                "{}: tool invocation failed: {status} - {body}",
                self.base_url
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{}: invalid tool result: {e}", self.base_url)))
    }
}
