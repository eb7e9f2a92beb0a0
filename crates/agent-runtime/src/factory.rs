//! Provider Factory
//!
//! Turns a request credential into a ready LLM client. Credentials are
//! checked before anything is constructed: a missing API key or URL is an
//! `Auth` error, an unknown provider or bad settings a `Config` error.

use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    AgentBuilder, AgentConfig, LlmSettings, ProviderKind,
    error::{AgentError, Result},
    provider::{LlmProvider, NativeToolCalling},
};
use serde::{Deserialize, Serialize};

use crate::openai::OpenAiCompatProvider;

/// llama.cpp servers can take minutes on large prompts
const LLAMA_CPP_TIMEOUT: Duration = Duration::from_secs(300);

type Clients = (Arc<dyn LlmProvider>, Option<Arc<dyn NativeToolCalling>>);

/// Which model to use and how to reach it
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Base URL, required for self-hosted providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API key, required for hosted providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, rename = "set", skip_serializing_if = "Option::is_none")]
    pub settings: Option<LlmSettings>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("settings", &self.settings)
            .finish()
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl Credential {
    /// Resolve the provider and check the credential carries what it needs
    pub fn check(&self) -> Result<ProviderKind> {
        if self.provider.trim().is_empty() {
            return Err(AgentError::Config("missing provider".into()));
        }
        let kind: ProviderKind = self.provider.parse()?;

        if kind.requires_api_key() && present(self.api_key.as_ref()).is_none() {
            return Err(AgentError::Auth(format!("{kind} API key is required")));
        }
        if kind.requires_url() && present(self.url.as_ref()).is_none() {
            return Err(AgentError::Auth(format!("{kind} URL is required")));
        }
        if let Some(settings) = &self.settings {
            settings.validate()?;
        }
        Ok(kind)
    }

    /// Requested model, or the provider's default
    pub fn model_for(&self, kind: ProviderKind) -> String {
        present(self.model.as_ref()).map_or_else(|| kind.default_model().to_string(), str::to_string)
    }
}

/// A constructed provider plus what the agent needs to drive it
#[derive(Clone)]
pub struct ProviderHandle {
    pub kind: ProviderKind,
    pub model: String,
    pub provider: Arc<dyn LlmProvider>,

    /// Set for providers with structured function calling
    pub native: Option<Arc<dyn NativeToolCalling>>,

    pub settings: LlmSettings,
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("native", &self.native.is_some())
            .finish_non_exhaustive()
    }
}

impl ProviderHandle {
    /// Agent configuration for this provider, model and settings
    pub fn agent_config(&self) -> Result<AgentConfig> {
        AgentConfig::from_settings(self.kind, self.model.clone(), &self.settings)
    }

    /// Builder wired to this provider
    pub fn agent_builder(&self, config: AgentConfig) -> AgentBuilder {
        let builder = AgentBuilder::new()
            .provider(Arc::clone(&self.provider))
            .config(config);
        match &self.native {
            Some(native) => builder.native(Arc::clone(native)),
            None => builder,
        }
    }
}

const fn hosted_base_url(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
        ProviderKind::OpenRouter => Some("https://openrouter.ai/api/v1"),
        ProviderKind::Claude => Some("https://api.anthropic.com/v1"),
        ProviderKind::Ollama | ProviderKind::LlamaCpp | ProviderKind::Vllm => None,
    }
}

/// Build the provider a credential describes
pub fn build_provider(credential: &Credential) -> Result<ProviderHandle> {
    let kind = credential.check()?;
    let model = credential.model_for(kind);
    let url = present(credential.url.as_ref()).unwrap_or_default().to_string();
    let api_key = present(credential.api_key.as_ref()).map(str::to_string);

    tracing::debug!(provider = %kind, %model, "Creating LLM client");

    let (provider, native): Clients = match kind {
        ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Claude => {
            let base = present(credential.url.as_ref())
                .or_else(|| hosted_base_url(kind))
                .unwrap_or_default();
            let client = Arc::new(OpenAiCompatProvider::new(kind, base, api_key));
            (Arc::clone(&client) as Arc<dyn LlmProvider>, Some(client as Arc<dyn NativeToolCalling>))
        }
        ProviderKind::LlamaCpp => {
            let http = reqwest::Client::builder()
                .timeout(LLAMA_CPP_TIMEOUT)
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;
            (
                Arc::new(OpenAiCompatProvider::with_client(kind, url, api_key, http)),
                None,
            )
        }
        ProviderKind::Vllm => (Arc::new(OpenAiCompatProvider::new(kind, url, api_key)), None),
        ProviderKind::Ollama => ollama_provider(url)?,
    };

    tracing::info!(provider = %kind, %model, native = native.is_some(), "LLM client created");

    Ok(ProviderHandle {
        kind,
        model,
        provider,
        native,
        settings: credential.settings.clone().unwrap_or_default(),
    })
}

#[cfg(feature = "ollama")]
fn ollama_provider(url: String) -> Result<Clients> {
    Ok((Arc::new(crate::ollama::OllamaProvider::new(&url)?), None))
}

#[cfg(not(feature = "ollama"))]
fn ollama_provider(_url: String) -> Result<Clients> {
    Err(AgentError::Config("built without the ollama feature".into()))
}
