//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Running out of iterations and failing to recognise a tool call are not
/// errors: both end a run normally and are reported through
/// [`RunOutcome`](crate::state::RunOutcome).
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid or incomplete configuration, detected before any call
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required credential (API key, endpoint URL) is missing
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// No tool-server endpoint was handed to the registry
    #[error("No tool endpoints configured")]
    NoToolEndpoints,

    /// Every endpoint reported the tool as unknown
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A single endpoint failed to execute a tool
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Every endpoint failed; `last` is the most recent endpoint's error
    #[error("Tool '{tool}' failed on all {attempts} endpoint(s): {last}")]
    AllEndpointsFailed {
        tool: String,
        attempts: usize,
        #[source]
        last: Box<AgentError>,
    },

    /// An outbound call exceeded its time limit
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The run was cancelled by the caller
    #[error("Run cancelled")]
    Cancelled,

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::Timeout { .. } | Self::Io(_)
        )
    }

    /// Whether the error came out of tool invocation.
    pub const fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::NoToolEndpoints
                | Self::ToolNotFound(_)
                | Self::ToolExecution(_)
                | Self::AllEndpointsFailed { .. }
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("Invalid configuration: {msg}"),
            Self::Auth(msg) => format!("Missing credentials: {msg}"),
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            err if err.is_tool_failure() => format!("Tool execution failed: {err}"),
            Self::Timeout { operation, .. } => format!("The request timed out ({operation})."),
            Self::Cancelled => "The request was cancelled.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failures_share_user_message() {
        let errors = [
            AgentError::NoToolEndpoints,
            AgentError::ToolNotFound("dice".into()),
            AgentError::AllEndpointsFailed {
                tool: "dice".into(),
                attempts: 2,
                last: Box::new(AgentError::ToolExecution("502 Bad Gateway".into())),
            },
        ];

        for err in &errors {
            assert!(err.is_tool_failure());
            assert!(err.user_message().starts_with("Tool execution failed"));
        }
    }

    #[test]
    fn test_all_endpoints_failed_keeps_last_error() {
        let err = AgentError::AllEndpointsFailed {
            tool: "dice".into(),
            attempts: 2,
            last: Box::new(AgentError::ToolExecution("connection refused".into())),
        };

        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("Tool execution error: connection refused")
        );
    }

    #[test]
    fn test_retryable() {
        assert!(AgentError::ProviderUnavailable("down".into()).is_retryable());
        assert!(!AgentError::Config("bad".into()).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
    }
}
