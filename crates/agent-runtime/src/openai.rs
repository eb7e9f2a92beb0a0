//! OpenAI-compatible LLM Provider
//!
//! One `POST {base}/chat/completions` client serves OpenAI, OpenRouter,
//! Claude (through Anthropic's OpenAI-compatible endpoint), llama.cpp server
//! and vLLM. Hosted providers also get [`NativeToolCalling`] through the
//! `tools` request field.

use agent_core::{
    config::ProviderKind,
    error::{AgentError, Result},
    message::{Message, ResponseMetadata, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, NativeRun,
        NativeToolCalling, ProviderInfo, StreamChunk, TokenUsage, bounded,
    },
    tool::{ToolCall, ToolDescriptor, ToolRegistry},
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;

use crate::sse::parse_sse_stream;
use crate::{status_error, transport_error};

/// Upper bound on model round trips in one native run
pub const MAX_NATIVE_ROUNDS: usize = 10;

const DONE_SENTINEL: &str = "[DONE]";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: ApiFunction,
}

fn function_kind() -> String {
    "function".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<ApiUsage> for TokenUsage {
    fn from(usage: ApiUsage) -> Self {
        Self::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Chat-completions client for every OpenAI-compatible backend
#[derive(Clone, Debug)]
pub struct OpenAiCompatProvider {
    kind: ProviderKind,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(kind: ProviderKind, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(kind, base_url, api_key, reqwest::Client::new())
    }

    pub fn with_client(
        kind: ProviderKind,
        base_url: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            kind,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Agent messages in wire form. Text-framed runs have no structured
    /// tool turns, so tool results travel as user messages.
    fn to_api_messages(messages: &[Message], structured: bool) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Tool if structured => ApiMessage {
                    tool_call_id: m.tool_call_id.clone(),
                    ..ApiMessage::new("tool", m.content.clone())
                },
                Role::Tool | Role::User => ApiMessage::new("user", m.content.clone()),
                Role::System => ApiMessage::new("system", m.content.clone()),
                Role::Assistant if structured && !m.tool_calls.is_empty() => ApiMessage {
                    tool_calls: Some(m.tool_calls.iter().map(to_api_call).collect()),
                    ..ApiMessage::new("assistant", m.content.clone())
                },
                Role::Assistant => ApiMessage::new("assistant", m.content.clone()),
            })
            .collect()
    }

    /// Function specs for the `tools` request field
    fn tool_specs(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    fn request<'a>(
        messages: &'a [ApiMessage],
        options: &'a GenerationOptions,
        stream: bool,
        tools: &'a [Value],
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages,
            stream,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            frequency_penalty: options.frequency_penalty,
            presence_penalty: options.presence_penalty,
            stop: (!options.stop_sequences.is_empty()).then_some(options.stop_sequences.as_slice()),
            tools: (!tools.is_empty()).then_some(tools),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(provider = %self.kind, model = request.model, stream = request.stream, "Sending chat request");

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| transport_error(&url, &e))?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AgentError::Auth(format!(
                "{} rejected the API key ({status})",
                self.kind
            )));
        }
        if !status.is_success() {
            let err = status_error(&url, response).await;
            tracing::warn!(provider = %self.kind, "{}", err);
            return Err(err);
        }
        Ok(response)
    }

    async fn chat(&self, messages: &[ApiMessage], options: &GenerationOptions, tools: &[Value]) -> Result<Round> {
        let response = self
            .send(&Self::request(messages, options, false, tools))
            .await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("invalid chat response: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("no choices in response".into()))?;

        Ok(Round {
            model: body.model.unwrap_or_else(|| options.model.clone()),
            usage: body.usage.map(TokenUsage::from),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_wire),
            message: choice.message,
        })
    }

    fn metadata(&self, round: &Round) -> ResponseMetadata {
        ResponseMetadata {
            model_name: Some(round.model.clone()),
            model_provider: Some(self.kind.to_string()),
            finish_reason: round.finish_reason.as_ref().map(|r| r.as_str().to_string()),
        }
    }
}

/// One parsed chat-completions round trip
struct Round {
    model: String,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
    message: ApiMessage,
}

fn to_api_call(call: &ToolCall) -> ApiToolCall {
    ApiToolCall {
        id: call.id.clone(),
        kind: function_kind(),
        function: ApiFunction {
            name: call.name.clone(),
            arguments: Value::Object(call.args.clone()).to_string(),
        },
    }
}

fn parse_arguments(call: &ApiToolCall) -> Result<Map<String, Value>> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(raw).map_err(|e| {
        AgentError::Provider(format!(
            "model sent invalid arguments for '{}': {e}",
            call.function.name
        ))
    })
}

fn add_usage(total: Option<TokenUsage>, round: Option<TokenUsage>) -> Option<TokenUsage> {
    match (total, round) {
        (Some(t), Some(r)) => Some(t.combined(&r)),
        (t, r) => t.or(r),
    }
}

fn stream_chunk(data: &str) -> Result<Option<StreamChunk>> {
    if data == DONE_SENTINEL {
        return Ok(Some(StreamChunk {
            done: true,
            ..Default::default()
        }));
    }

    let parsed: StreamResponse = serde_json::from_str(data)
        .map_err(|e| AgentError::Provider(format!("invalid stream chunk: {e}")))?;

    let delta: String = parsed
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    let usage = parsed.usage.map(TokenUsage::from);

    if delta.is_empty() && usage.is_none() {
        return Ok(None);
    }
    Ok(Some(StreamChunk {
        delta,
        done: false,
        usage,
    }))
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.kind.to_string(),
            supports_streaming: true,
            supports_tools: self.kind.supports_native_tools(),
        }
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let wire = Self::to_api_messages(messages, false);
        let round = self.chat(&wire, options, &[]).await?;

        Ok(Completion {
            content: round.message.content.unwrap_or_default(),
            model: round.model,
            usage: round.usage,
            finish_reason: round.finish_reason,
        })
    }

    async fn complete_stream(&self, messages: &[Message], options: &GenerationOptions) -> Result<CompletionStream> {
        let wire = Self::to_api_messages(messages, false);
        let response = self
            .send(&Self::request(&wire, options, true, &[]))
            .await?;

        let chunks = parse_sse_stream(response).filter_map(|event| async move {
            match event {
                Ok(event) => stream_chunk(&event.data).transpose(),
                Err(e) => Some(Err(AgentError::Provider(e.to_string()))),
            }
        });

        Ok(Box::pin(chunks))
    }
}

#[async_trait]
impl NativeToolCalling for OpenAiCompatProvider {
    async fn run_with_tools(
        &self,
        messages: &[Message],
        tools: &ToolRegistry,
        options: &GenerationOptions,
        call_timeout: Option<Duration>,
    ) -> Result<NativeRun> {
        let specs = Self::tool_specs(tools.descriptors());
        let mut wire = Self::to_api_messages(messages, true);
        let mut transcript = Vec::new();
        let mut usage = None;

        for round_no in 1..=MAX_NATIVE_ROUNDS {
            let round = bounded(call_timeout, "model call", self.chat(&wire, options, &specs)).await?;
            usage = add_usage(usage, round.usage);
            let metadata = self.metadata(&round);
            let content = round.message.content.clone().unwrap_or_default();
            let api_calls = round.message.tool_calls.clone().unwrap_or_default();

            if api_calls.is_empty() {
                transcript.push(
                    Message::assistant(content.clone())
                        .with_usage(round.usage)
                        .with_metadata(metadata),
                );
                return Ok(NativeRun {
                    completion: Completion {
                        content,
                        model: round.model,
                        usage,
                        finish_reason: round.finish_reason,
                    },
                    transcript,
                    iterations: round_no,
                });
            }

            tracing::debug!(round = round_no, calls = api_calls.len(), "Model requested tools");

            let mut calls = Vec::with_capacity(api_calls.len());
            for call in &api_calls {
                calls.push(ToolCall::with_id(
                    call.id.clone(),
                    call.function.name.clone(),
                    parse_arguments(call)?,
                ));
            }

            wire.push(round.message);
            transcript.push(
                Message::assistant(content)
                    .with_tool_calls(calls.clone())
                    .with_usage(round.usage)
                    .with_metadata(metadata),
            );

            for call in calls {
                let result = tools.invoke(&call.name, &call.args).await?;
                let rendered = serde_json::to_string(&result)?;
                wire.push(ApiMessage {
                    tool_call_id: Some(call.id.clone()),
                    ..ApiMessage::new("tool", rendered.clone())
                });
                transcript.push(Message::tool(rendered, call.id, call.name));
            }
        }

        Err(AgentError::Provider(format!(
            "model still requesting tools after {MAX_NATIVE_ROUNDS} rounds"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_server::HttpToolServer;
    use agent_core::tool::ToolEndpoint;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> GenerationOptions {
        GenerationOptions {
            temperature: Some(0.2),
            ..GenerationOptions::for_model("gpt-4o-mini")
        }
    }

    #[test]
    fn test_manual_wire_messages_fold_tool_results_into_user_turns() {
        let call = ToolCall::with_id("call_1", "dice", Map::new());
        let messages = vec![
            Message::system("sys"),
            Message::assistant("{\"tool\":\"dice\"}").with_tool_calls(vec![call]),
            Message::tool("4", "call_1", "dice"),
        ];

        let manual = OpenAiCompatProvider::to_api_messages(&messages, false);
        assert_eq!(manual[1].role, "assistant");
        assert!(manual[1].tool_calls.is_none());
        assert_eq!(manual[2].role, "user");

        let structured = OpenAiCompatProvider::to_api_messages(&messages, true);
        assert_eq!(structured[1].tool_calls.as_ref().map(Vec::len), Some(1));
        assert_eq!(structured[2].role, "tool");
        assert_eq!(structured[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_stream_chunk_parsing() {
        let chunk = stream_chunk(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap().unwrap();
        assert_eq!(chunk.delta, "Hi");
        assert!(!chunk.done);

        assert!(stream_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap().is_none());

        let usage = stream_chunk(r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(usage.usage, Some(TokenUsage::new(3, 2)));

        assert!(stream_chunk("[DONE]").unwrap().unwrap().done);
        assert!(stream_chunk("{not json").is_err());
    }

    #[tokio::test]
    async fn test_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "stream": false, "temperature": 0.2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024",
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(ProviderKind::OpenAi, server.uri(), Some("sk-test".into()));
        let completion = provider.complete(&[Message::user("hi")], &options()).await.unwrap();

        assert_eq!(completion.content, "Hello!");
        assert_eq!(completion.model, "gpt-4o-mini-2024");
        assert_eq!(completion.usage, Some(TokenUsage::new(9, 3)));
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bad-key/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/overloaded/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let bad_key = OpenAiCompatProvider::new(ProviderKind::OpenAi, format!("{}/bad-key", server.uri()), None);
        assert!(matches!(
            bad_key.complete(&[Message::user("hi")], &options()).await,
            Err(AgentError::Auth(_))
        ));

        let overloaded = OpenAiCompatProvider::new(ProviderKind::Vllm, format!("{}/overloaded", server.uri()), None);
        assert!(matches!(
            overloaded.complete(&[Message::user("hi")], &options()).await,
            Err(AgentError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"<message>Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo</message>\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":4}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true, "stream_options": {"include_usage": true}})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(ProviderKind::LlamaCpp, format!("{}/v1/", server.uri()), None);
        let chunks: Vec<StreamChunk> = provider
            .complete_stream(&[Message::user("hi")], &options())
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        let text: String = chunks.iter().map(|c| c.delta.as_str()).collect();
        assert_eq!(text, "<message>Hello</message>");
        assert_eq!(chunks[2].usage, Some(TokenUsage::new(5, 4)));
        assert!(chunks.last().unwrap().done);
    }

    #[tokio::test]
    async fn test_native_run_invokes_tools_then_answers() {
        let tools_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/invoke"))
            .and(body_partial_json(json!({"name": "convert", "arguments": {"f": 212}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"c": 100})))
            .expect(1)
            .mount(&tools_server)
            .await;

        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {"name": "convert", "arguments": "{\"f\": 212}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 5}
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&llm)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("\"tool_call_id\":\"call_abc\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "212F is 100C"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 30, "completion_tokens": 6}
            })))
            .mount(&llm)
            .await;

        let endpoints: Vec<Arc<dyn ToolEndpoint>> = vec![Arc::new(HttpToolServer::new(tools_server.uri()))];
        let registry = ToolRegistry::from_parts(endpoints, Vec::new());
        let provider = OpenAiCompatProvider::new(ProviderKind::OpenAi, llm.uri(), Some("sk".into()));

        let run = provider
            .run_with_tools(
                &[Message::system("sys"), Message::user("convert 212F")],
                &registry,
                &options(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(run.iterations, 2);
        assert_eq!(run.completion.content, "212F is 100C");
        assert_eq!(run.completion.usage, Some(TokenUsage::new(50, 11)));
        assert_eq!(run.transcript.len(), 3);
        assert_eq!(run.transcript[0].tool_calls[0].id, "call_abc");
        assert_eq!(run.transcript[1].role, Role::Tool);
        assert_eq!(run.transcript[1].content, "{\"c\":100}");
        assert!(run.transcript[2].is_terminal());
    }

    #[tokio::test]
    async fn test_native_run_gives_up_after_round_limit() {
        let tools_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
            .mount(&tools_server)
            .await;

        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "tool_calls": [{"id": "c", "type": "function", "function": {"name": "roll", "arguments": ""}}]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .expect(MAX_NATIVE_ROUNDS as u64)
            .mount(&llm)
            .await;

        let endpoints: Vec<Arc<dyn ToolEndpoint>> = vec![Arc::new(HttpToolServer::new(tools_server.uri()))];
        let registry = ToolRegistry::from_parts(endpoints, Vec::new());
        let provider = OpenAiCompatProvider::new(ProviderKind::OpenRouter, llm.uri(), Some("sk".into()));

        let result = provider
            .run_with_tools(&[Message::user("roll forever")], &registry, &options(), None)
            .await;
        assert!(matches!(result, Err(AgentError::Provider(_))));
    }

    #[tokio::test]
    async fn test_native_round_times_out() {
        let llm = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "choices": [{"message": {"role": "assistant", "content": "too late"}, "finish_reason": "stop"}]
                    }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&llm)
            .await;

        let provider = OpenAiCompatProvider::new(ProviderKind::OpenAi, llm.uri(), Some("sk".into()));
        let result = provider
            .run_with_tools(
                &[Message::user("hi")],
                &ToolRegistry::new(),
                &options(),
                Some(Duration::from_millis(100)),
            )
            .await;

        assert!(matches!(
            result,
            Err(AgentError::Timeout { after, .. }) if after == Duration::from_millis(100)
        ));
    }
}
