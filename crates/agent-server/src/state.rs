//! Application State

use std::sync::Arc;

use agent_core::event::DEFAULT_EVENT_BUFFER;

/// Process settings, read once at startup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Log full model output and tool arguments
    pub verbose: bool,

    /// Capacity of each stream's event channel
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:6000".into(),
            verbose: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            verbose: lookup("VERBOSE").is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1")),
            event_buffer: lookup("EVENT_BUFFER")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.event_buffer),
        }
    }
}

/// Shared application state
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}
