//! HTTP/SSE Handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use agent_core::{
    Agent, AgentError, Message, ToolEndpoint, ToolRegistry, event::EventKind, provider::TokenUsage,
};
use agent_runtime::{Credential, HttpToolServer, build_provider};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub credential: Credential,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub input: String,
    /// Tool server base URLs, in failover order
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub messages: Vec<Message>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub total_iterations: usize,
    pub tool_calls_count: usize,
    pub execution_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A request failure rendered as `{"error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Status for an error raised while checking a request
    fn rejected(err: &AgentError) -> Self {
        let status = match err {
            AgentError::Auth(_) => StatusCode::UNAUTHORIZED,
            AgentError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected body: {}", rejection);
        Self::new(StatusCode::BAD_REQUEST, "Invalid request body")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

// ============================================================================
// Request preparation
// ============================================================================

/// A validated request, ready to run
struct Prepared {
    agent: Agent,
    input: String,
    /// Healthy tool servers, in request order
    available_servers: Vec<String>,
    total_servers: usize,
}

/// Validate the request, probe its tool servers and build the agent
async fn prepare(state: &AppState, body: ChatRequest) -> Result<Prepared, ApiError> {
    if body.credential.provider.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing provider"));
    }
    body.credential.check().map_err(|e| ApiError::rejected(&e))?;
    if body.input.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Missing input"));
    }

    let (tools, available_servers) = load_tools(&body.servers).await?;

    let handle = build_provider(&body.credential).map_err(|e| ApiError::rejected(&e))?;
    let mut config = handle
        .agent_config()
        .map_err(|e| ApiError::rejected(&e))?
        .with_verbose(state.config.verbose);
    if let Some(prompt) = body.system_prompt.filter(|p| !p.trim().is_empty()) {
        config = config.with_system_prompt(prompt);
    }

    let agent = handle.agent_builder(config).tools(tools).build().map_err(|e| {
        tracing::error!("Failed to create agent: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    tracing::info!(
        request_id = agent.request_id(),
        provider = %handle.kind,
        model = %handle.model,
        mode = agent.mode().as_str(),
        "Agent ready"
    );
    Ok(Prepared {
        agent,
        input: body.input,
        available_servers,
        total_servers: body.servers.len(),
    })
}

/// Keep the healthy servers and load their catalogs. No servers means no
/// tools; servers given but none healthy is a 503.
async fn load_tools(servers: &[String]) -> Result<(ToolRegistry, Vec<String>), ApiError> {
    if servers.is_empty() {
        return Ok((ToolRegistry::new(), Vec::new()));
    }

    let endpoints: Vec<Arc<dyn ToolEndpoint>> = servers
        .iter()
        .map(|url| Arc::new(HttpToolServer::new(url.as_str())) as Arc<dyn ToolEndpoint>)
        .collect();

    let healthy = ToolRegistry::check_health(endpoints).await;
    if healthy.is_empty() {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "No tool servers available",
        ));
    }
    let available = healthy.iter().map(|e| e.url().to_string()).collect();
    tracing::info!(available = healthy.len(), total = servers.len(), "Tool servers checked");
    Ok((ToolRegistry::load(healthy).await, available))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Run to completion and return the transcript
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(body) = payload?;
    let started = Instant::now();
    let Prepared { agent, input, .. } = prepare(&state, body).await?;

    // Dropping the handler future (client gone) cancels the run
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = agent.run(&input, &cancel).await.map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.user_message())
    })?;

    let message = outcome.display_message().unwrap_or_default().to_string();
    Ok(Json(ChatResponse {
        message,
        final_answer: outcome.final_answer,
        usage: outcome.usage_totals,
        total_iterations: outcome.iteration_count,
        tool_calls_count: outcome.tool_call_count,
        messages: outcome.messages,
        execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }))
}

/// Run with server-sent events. Request errors are returned as JSON before
/// the stream opens.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let Json(body) = payload?;
    let prepared = prepare(&state, body).await?;
    let servers_checked = EventKind::ServersChecked {
        available_servers: prepared.available_servers,
        total_servers: prepared.total_servers,
    };

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let events = prepared.agent.run_stream_with(
        prepared.input,
        cancel,
        state.config.event_buffer,
        vec![servers_checked],
    );

    // The guard lives as long as the body; a disconnect cancels the run
    let stream = events.map(move |event| {
        let _guard = &guard;
        Event::default().json_data(&event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
