//! Tool System
//!
//! Tools live on remote tool servers. A [`ToolEndpoint`] is one such server;
//! the [`ToolRegistry`] holds the healthy endpoints of a run together with
//! the descriptors they advertised, and invokes tools with ordered failover
//! across endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentError, Result};

/// Tool call request recognised in (or natively issued by) model output.
/// Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique within a run; correlates the tool result message
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    pub args: Map<String, Value>,

    /// Origin tag ("tool_call")
    #[serde(rename = "type", default = "default_call_kind")]
    pub kind: String,
}

fn default_call_kind() -> String {
    ToolCall::KIND.into()
}

impl ToolCall {
    pub const KIND: &'static str = "tool_call";

    /// Create a call with a fresh unique id
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::with_id(format!("call_{}", uuid::Uuid::new_v4().simple()), name, args)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            kind: Self::KIND.into(),
        }
    }
}

/// Schema of a single parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Enum of allowed values
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

/// JSON-schema-like parameter object of a tool
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,

    /// Parameters by name, ordered for stable prompts
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,

    /// Names of required parameters
    #[serde(default, deserialize_with = "null_as_empty")]
    pub required: Vec<String>,
}

fn default_schema_type() -> String {
    "object".into()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: default_schema_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// Tool definition advertised by a tool server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    #[serde(default)]
    pub description: String,

    /// Parameter definitions
    #[serde(default, alias = "parameter_schema")]
    pub parameters: ParameterSchema,
}

/// One tool server.
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    /// Base URL, used for logging
    fn url(&self) -> &str;

    /// Whether the server answers its health probe
    async fn health(&self) -> bool;

    /// The server's tool catalog
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke `name` on this server. Returns [`AgentError::ToolNotFound`]
    /// when the server does not know the tool.
    async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value>;
}

/// Tools available to one run, and the endpoints that serve them
#[derive(Clone, Default)]
pub struct ToolRegistry {
    endpoints: Vec<Arc<dyn ToolEndpoint>>,
    descriptors: Vec<ToolDescriptor>,
    attempt_timeout: Option<Duration>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("endpoints", &self.endpoints.iter().map(|e| e.url()).collect::<Vec<_>>())
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// A registry with no endpoints and no tools
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from endpoints and already known descriptors
    pub fn from_parts(endpoints: Vec<Arc<dyn ToolEndpoint>>, descriptors: Vec<ToolDescriptor>) -> Self {
        Self {
            endpoints,
            descriptors,
            attempt_timeout: None,
        }
    }

    /// Keep only endpoints whose health probe succeeds, in their given order
    pub async fn check_health(endpoints: Vec<Arc<dyn ToolEndpoint>>) -> Vec<Arc<dyn ToolEndpoint>> {
        let total = endpoints.len();
        let mut healthy = Vec::with_capacity(total);

        for (idx, endpoint) in endpoints.into_iter().enumerate() {
            if endpoint.health().await {
                tracing::debug!(endpoint = endpoint.url(), "[{}/{}] healthy", idx + 1, total);
                healthy.push(endpoint);
            } else {
                tracing::warn!(endpoint = endpoint.url(), "[{}/{}] not available", idx + 1, total);
            }
        }

        tracing::info!("Available tool servers: {}/{}", healthy.len(), total);
        healthy
    }

    /// Fetch every endpoint's catalog. An endpoint whose catalog cannot be
    /// fetched is skipped for discovery but still used for invocation.
    pub async fn load(endpoints: Vec<Arc<dyn ToolEndpoint>>) -> Self {
        let mut descriptors = Vec::new();

        for endpoint in &endpoints {
            match endpoint.list_tools().await {
                Ok(tools) => {
                    tracing::debug!(endpoint = endpoint.url(), count = tools.len(), "Loaded tools");
                    descriptors.extend(tools);
                }
                Err(e) => {
                    tracing::warn!(endpoint = endpoint.url(), "Failed to load tools: {}", e);
                }
            }
        }

        tracing::info!("Total tools loaded: {}", descriptors.len());
        Self::from_parts(endpoints, descriptors)
    }

    /// Bound each endpoint attempt; a timed-out attempt counts as a failure
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Invoke a tool, trying each endpoint in order until one succeeds.
    ///
    /// Never retries the same endpoint. Results are not cached: tools may be
    /// non-idempotent.
    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        if self.endpoints.is_empty() {
            return Err(AgentError::NoToolEndpoints);
        }

        let mut last_error = None;
        let mut all_not_found = true;

        for endpoint in &self.endpoints {
            match self.attempt(endpoint.as_ref(), name, args).await {
                Ok(result) => {
                    tracing::debug!(tool = name, endpoint = endpoint.url(), "Tool succeeded");
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(tool = name, endpoint = endpoint.url(), "Tool attempt failed: {}", e);
                    all_not_found &= matches!(e, AgentError::ToolNotFound(_));
                    last_error = Some(e);
                }
            }
        }

        if all_not_found {
            return Err(AgentError::ToolNotFound(name.to_string()));
        }

        Err(AgentError::AllEndpointsFailed {
            tool: name.to_string(),
            attempts: self.endpoints.len(),
            last: Box::new(last_error.unwrap_or(AgentError::NoToolEndpoints)),
        })
    }

    async fn attempt(&self, endpoint: &dyn ToolEndpoint, name: &str, args: &Map<String, Value>) -> Result<Value> {
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, endpoint.invoke(name, args))
                .await
                .map_err(|_| AgentError::Timeout {
                    operation: format!("tool '{name}' on {}", endpoint.url()),
                    after: limit,
                })?,
            None => endpoint.invoke(name, args).await,
        }
    }

    /// Descriptors of every loaded tool
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    /// Get a descriptor by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Number of endpoints
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Number of loaded tools
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEndpoint;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_descriptor_wire_format() {
        let raw = json!({
            "name": "convert_temperature",
            "description": "Convert between units",
            "parameters": {
                "type": "object",
                "properties": {
                    "value": {"type": "number", "description": "Input value"},
                    "to": {"type": "string", "enum": ["C", "F"]}
                },
                "required": ["value", "to"]
            }
        });

        let desc: ToolDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(desc.parameters.properties.len(), 2);
        assert!(desc.parameters.is_required("to"));
        assert_eq!(desc.parameters.properties["to"].enum_values.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_descriptor_null_required() {
        let raw = json!({"name": "now", "parameters": {"type": "object", "properties": {}, "required": null}});
        let desc: ToolDescriptor = serde_json::from_value(raw).unwrap();
        assert!(desc.parameters.required.is_empty());
    }

    #[test]
    fn test_call_ids_are_unique() {
        let a = ToolCall::new("dice", Map::new());
        let b = ToolCall::new("dice", Map::new());
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, "tool_call");
    }

    #[tokio::test]
    async fn test_failover_to_second_endpoint() {
        let first = Arc::new(MockEndpoint::failing("http://a"));
        let second = Arc::new(MockEndpoint::answering("http://b", json!({"result": 4})));
        let registry = ToolRegistry::from_parts(vec![first.clone(), second.clone()], Vec::new());

        let result = registry.invoke("add", &args(json!({"a": 2, "b": 2}))).await.unwrap();

        assert_eq!(result, json!({"result": 4}));
        assert_eq!(first.invocations(), 1);
        assert_eq!(second.invocations(), 1);
    }

    #[tokio::test]
    async fn test_first_success_stops_failover() {
        let first = Arc::new(MockEndpoint::answering("http://a", json!(1)));
        let second = Arc::new(MockEndpoint::answering("http://b", json!(2)));
        let registry = ToolRegistry::from_parts(vec![first, second.clone()], Vec::new());

        assert_eq!(registry.invoke("x", &Map::new()).await.unwrap(), json!(1));
        assert_eq!(second.invocations(), 0);
    }

    #[tokio::test]
    async fn test_no_endpoints() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("x", &Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::NoToolEndpoints));
    }

    #[tokio::test]
    async fn test_all_endpoints_fail_reports_last_error() {
        let registry = ToolRegistry::from_parts(
            vec![
                Arc::new(MockEndpoint::failing("http://a")),
                Arc::new(MockEndpoint::failing("http://b")),
            ],
            Vec::new(),
        );

        match registry.invoke("x", &Map::new()).await.unwrap_err() {
            AgentError::AllEndpointsFailed { tool, attempts, last } => {
                assert_eq!(tool, "x");
                assert_eq!(attempts, 2);
                assert!(last.to_string().contains("http://b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_everywhere() {
        let registry = ToolRegistry::from_parts(
            vec![
                Arc::new(MockEndpoint::unknown_tools("http://a")),
                Arc::new(MockEndpoint::unknown_tools("http://b")),
            ],
            Vec::new(),
        );

        let err = registry.invoke("teleport", &Map::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(name) if name == "teleport"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_fails_over() {
        let slow = Arc::new(MockEndpoint::answering("http://slow", json!("late")).with_delay(Duration::from_secs(30)));
        let fast = Arc::new(MockEndpoint::answering("http://fast", json!("ok")));
        let registry = ToolRegistry::from_parts(vec![slow, fast], Vec::new())
            .with_attempt_timeout(Some(Duration::from_secs(1)));

        assert_eq!(registry.invoke("x", &Map::new()).await.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_health_and_load() {
        let healthy = Arc::new(MockEndpoint::answering("http://a", json!(null)).with_tools(vec![ToolDescriptor {
            name: "roll_dice".into(),
            description: "Roll dice".into(),
            parameters: ParameterSchema::default(),
        }]));
        let down = Arc::new(MockEndpoint::failing("http://down").unhealthy());
        let no_catalog = Arc::new(MockEndpoint::failing("http://b"));

        let endpoints: Vec<Arc<dyn ToolEndpoint>> = vec![healthy, down, no_catalog];
        let available = ToolRegistry::check_health(endpoints).await;
        assert_eq!(available.iter().map(|e| e.url()).collect::<Vec<_>>(), ["http://a", "http://b"]);

        let registry = ToolRegistry::load(available).await;
        assert_eq!(registry.names(), ["roll_dice"]);
        assert_eq!(registry.endpoint_count(), 2);
        assert!(registry.get("roll_dice").is_some());
    }
}
