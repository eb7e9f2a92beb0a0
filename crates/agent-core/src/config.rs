//! Configuration
//!
//! Request-level model settings, provider capabilities, and the per-run
//! agent configuration. Everything here is validated before the first
//! model or tool call so a bad request fails fast.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::provider::GenerationOptions;

/// Default ceiling on plan/act/observe iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Default number of prior messages kept in a prompt
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 4;

/// Supported model backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "claude")]
    Claude,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "llama_cpp")]
    LlamaCpp,
    #[serde(rename = "vllm")]
    Vllm,
}

/// How a provider frames its streamed output
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// `<thinking>...</thinking><message>...</message>` in-band tags
    Tagged,
    /// Every token is message content
    Plain,
}

impl ProviderKind {
    pub const ALL: [Self; 6] = [
        Self::OpenAi,
        Self::Claude,
        Self::OpenRouter,
        Self::Ollama,
        Self::LlamaCpp,
        Self::Vllm,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Claude => "claude",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
            Self::LlamaCpp => "llama_cpp",
            Self::Vllm => "vllm",
        }
    }

    /// Hosted providers with structured function calling
    pub const fn supports_native_tools(self) -> bool {
        matches!(self, Self::OpenAi | Self::Claude | Self::OpenRouter)
    }

    pub const fn framing(self) -> Framing {
        match self {
            Self::LlamaCpp => Framing::Tagged,
            _ => Framing::Plain,
        }
    }

    /// Hosted providers need an API key
    pub const fn requires_api_key(self) -> bool {
        self.supports_native_tools()
    }

    /// Self-hosted providers need a base URL
    pub const fn requires_url(self) -> bool {
        !self.requires_api_key()
    }

    /// Model used when the request names none
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Claude => "claude-3-5-sonnet-20241022",
            Self::OpenRouter => "anthropic/claude-3.5-sonnet",
            Self::Ollama => "llama3.2",
            Self::LlamaCpp => "gpt-oss-20b.gguf",
            Self::Vllm => "meta-llama/Llama-3.2-3B-Instruct",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| AgentError::Config(format!("unsupported provider '{s}'")))
    }
}

/// Optional model settings supplied with a request
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Per-call timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,

    /// Prompt history window, overriding the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_messages: Option<i64>,
}

impl LlmSettings {
    /// Reject values no provider would accept
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AgentError::Config(format!("temperature must be within 0..=2, got {t}")));
            }
        }
        if let Some(p) = self.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(AgentError::Config(format!("top_p must be within 0..=1, got {p}")));
            }
        }
        for (name, value) in [
            ("frequency_penalty", self.frequency_penalty),
            ("presence_penalty", self.presence_penalty),
        ] {
            if let Some(v) = value {
                if !(-2.0..=2.0).contains(&v) {
                    return Err(AgentError::Config(format!("{name} must be within -2..=2, got {v}")));
                }
            }
        }
        if let Some(n) = self.max_tokens {
            if n <= 0 || u32::try_from(n).is_err() {
                return Err(AgentError::Config(format!("max_tokens must be positive, got {n}")));
            }
        }
        if let Some(secs) = self.timeout {
            if secs <= 0 {
                return Err(AgentError::Config(format!("timeout must be positive, got {secs}")));
            }
        }
        if let Some(window) = self.max_context_messages {
            if window < 0 {
                return Err(AgentError::Config(format!(
                    "max_context_messages must not be negative, got {window}"
                )));
            }
        }
        Ok(())
    }

    /// Generation options for `model` carrying these settings
    pub fn to_generation_options(&self, model: impl Into<String>) -> GenerationOptions {
        GenerationOptions {
            model: model.into(),
            temperature: self.temperature,
            max_tokens: self.max_tokens.and_then(|n| u32::try_from(n).ok()),
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            stop_sequences: self.stop.clone(),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }

    pub fn history_window(&self) -> Option<usize> {
        self.max_context_messages
            .and_then(|n| usize::try_from(n).ok())
    }
}

/// Per-run agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Backend serving the model; decides framing and tool-calling mode
    pub provider: ProviderKind,

    /// Prepended once, on the first turn
    pub system_prompt: Option<String>,

    /// Maximum reasoning iterations before the run ends without an answer
    pub max_iterations: usize,

    /// Prior messages kept in each prompt
    pub max_history_messages: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Limit on each model call and tool attempt
    pub call_timeout: Option<Duration>,

    /// Log full model output and tool arguments
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(ProviderKind::Ollama)
    }
}

impl AgentConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_history_messages: DEFAULT_MAX_HISTORY_MESSAGES,
            generation: GenerationOptions::for_model(provider.default_model()),
            call_timeout: None,
            verbose: false,
        }
    }

    /// Config for `provider` and `model` with request settings applied.
    /// Validates the settings first.
    pub fn from_settings(provider: ProviderKind, model: impl Into<String>, settings: &LlmSettings) -> Result<Self> {
        settings.validate()?;

        let mut config = Self::new(provider);
        config.generation = settings.to_generation_options(model);
        config.call_timeout = settings.call_timeout();
        if let Some(window) = settings.history_window() {
            config.max_history_messages = window;
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(AgentError::Config("model must not be empty".into()));
        }
        if self.call_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AgentError::Config("call timeout must be positive".into()));
        }
        Ok(())
    }
}
