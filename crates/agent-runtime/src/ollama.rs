//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, ProviderInfo,
        StreamChunk, TokenUsage, bounded,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    models::ModelOptions,
};

/// Ollama provider configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OllamaConfig {
    /// Ollama host URL, scheme included
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Bound on each chat request
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout: Duration::from_secs(120),
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost".into());
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self {
            host,
            port,
            ..Default::default()
        }
    }

    /// Split a base URL such as `http://gpu-box:11434` into host and port
    pub fn from_url(base_url: &str) -> Result<Self> {
        let url = reqwest::Url::parse(base_url.trim())
            .map_err(|e| AgentError::Config(format!("invalid Ollama URL '{base_url}': {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| AgentError::Config(format!("Ollama URL '{base_url}' has no host")))?;

        Ok(Self {
            host: format!("{}://{host}", url.scheme()),
            port: url.port_or_known_default().unwrap_or(11434),
            ..Default::default()
        })
    }

    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl std::fmt::Debug for OllamaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OllamaProvider {
    /// Create a provider for the server at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        OllamaConfig::from_url(base_url).map(Self::from_config)
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            config,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::Assistant => MessageRole::Assistant,
                    // Tool results are read back as user context
                    Role::User | Role::Tool => MessageRole::User,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    /// Build Ollama model options, forwarding only what is set
    fn build_options(opts: &GenerationOptions) -> ModelOptions {
        let mut options = ModelOptions::default();
        if let Some(temperature) = opts.temperature {
            options = options.temperature(temperature);
        }
        if let Some(top_p) = opts.top_p {
            options = options.top_p(top_p);
        }
        if let Some(max_tokens) = opts.max_tokens {
            options = options.num_predict(i32::try_from(max_tokens).unwrap_or(i32::MAX));
        }
        if !opts.stop_sequences.is_empty() {
            options = options.stop(opts.stop_sequences.clone());
        }
        options
    }

    fn build_request(messages: &[Message], opts: &GenerationOptions) -> ChatMessageRequest {
        ChatMessageRequest::new(opts.model.clone(), Self::convert_messages(messages))
            .options(Self::build_options(opts))
    }

    fn request_error(&self, err: &impl std::fmt::Display) -> AgentError {
        AgentError::Provider(format!("Ollama at {}: {err}", self.config.base_url()))
    }
}

fn token_count<N: TryInto<u32>>(n: N) -> u32 {
    n.try_into().unwrap_or(u32::MAX)
}

/// Usage reported on the final response of a generation
fn usage(response: &ChatMessageResponse) -> Option<TokenUsage> {
    response
        .final_data
        .as_ref()
        .map(|d| TokenUsage::new(token_count(d.prompt_eval_count), token_count(d.eval_count)))
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama".into(),
            supports_streaming: true,
            supports_tools: false,
        }
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let request = Self::build_request(messages, options);
        tracing::debug!(model = %options.model, "Sending Ollama chat request");

        let response = bounded(Some(self.config.timeout), "Ollama chat", async {
            self.client
                .send_chat_messages(request)
                .await
                .map_err(|e| self.request_error(&e))
        })
        .await?;

        Ok(Completion {
            usage: usage(&response),
            content: response.message.content,
            model: options.model.clone(),
            finish_reason: Some(FinishReason::Stop),
        })
    }

    async fn complete_stream(&self, messages: &[Message], options: &GenerationOptions) -> Result<CompletionStream> {
        let request = Self::build_request(messages, options);
        tracing::debug!(model = %options.model, "Opening Ollama chat stream");

        let stream = bounded(Some(self.config.timeout), "Ollama chat stream", async {
            self.client
                .send_chat_messages_stream(request)
                .await
                .map_err(|e| self.request_error(&e))
        })
        .await?;

        let mapped = stream.map(|item| match item {
            Ok(chunk) => {
                let usage = usage(&chunk);
                Ok(StreamChunk {
                    done: chunk.final_data.is_some(),
                    usage,
                    delta: chunk.message.content,
                })
            }
            Err(_) => Err(AgentError::Provider("unreadable Ollama stream chunk".into())),
        });

        Ok(Box::pin(mapped))
    }
}
