//! # agent-runtime
//!
//! HTTP collaborators for the agent engine.
//!
//! ## Providers
//!
//! - **OpenAI-compatible**: OpenAI, OpenRouter, Claude (Anthropic's
//!   OpenAI-compatible endpoint), llama.cpp server and vLLM, with streaming
//!   and native function calling
//! - **Ollama** (default feature): local inference through `ollama-rs`
//!
//! ## Tools
//!
//! [`HttpToolServer`] talks to one tool server; hand a list of them to
//! `ToolRegistry::check_health` and `ToolRegistry::load`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::factory::{Credential, build_provider};
//!
//! let handle = build_provider(&credential)?;
//! let agent = handle.agent_builder(config).tools(registry).build()?;
//! ```

pub mod factory;
pub mod openai;
pub mod sse;
pub mod tool_server;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use factory::{Credential, ProviderHandle, build_provider};
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;
pub use tool_server::HttpToolServer;

// Re-export core types for convenience
pub use agent_core::{Agent, AgentError, LlmProvider, Message, Result, Role, ToolRegistry};

/// Map a transport failure onto the agent error taxonomy
pub(crate) fn transport_error(target: &str, err: &reqwest::Error) -> AgentError {
    if err.is_connect() {
        AgentError::ProviderUnavailable(format!("{target}: {err}"))
    } else {
        AgentError::Provider(format!("{target}: {err}"))
    }
}

/// Error for a non-success HTTP response, consuming its body
pub(crate) async fn status_error(target: &str, response: reqwest::Response) -> AgentError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        AgentError::ProviderUnavailable(format!("{target} returned {status}: {body}"))
    } else {
        AgentError::Provider(format!("{target} returned {status}: {body}"))
    }
}
