//! Conversation Messages
//!
//! Standard message format used across the agent system, and the
//! append-only transcript a run accumulates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::TokenUsage;
use crate::tool::ToolCall;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Tool calls recognised in an assistant message. Empty means terminal.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// For tool messages: the id of the call this result answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For tool messages: the tool name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Token usage reported for the generation that produced this message
    #[serde(rename = "usage_metadata", skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Provider response metadata
    #[serde(rename = "response_metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Provider-reported metadata for an assistant message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Model that generated the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Provider that served the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<String>,

    /// Why generation stopped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            usage: None,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message answering `call_id`
    pub fn tool(
        content: impl Into<String>,
        call_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(call_id.into());
        msg.name = Some(name.into());
        msg
    }

    /// Attach the tool calls recognised in this message
    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Attach token usage
    #[must_use]
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Attach response metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: ResponseMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this assistant message ends the run
    pub fn is_terminal(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// Append-only transcript of one run.
///
/// Messages are never removed or edited once pushed; prompt windows are
/// slices over the tail.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Add several messages, preserving their order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent `max` messages (all of them if fewer exist)
    pub fn window(&self, max: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max);
        &self.messages[start..]
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Sum of the token usage recorded on every message, if any was reported
    pub fn usage_totals(&self) -> Option<TokenUsage> {
        self.messages
            .iter()
            .filter_map(|m| m.usage.as_ref())
            .fold(None, |acc: Option<TokenUsage>, usage| {
                Some(acc.unwrap_or_default().combined(usage))
            })
    }

    /// Total number of tool calls recorded across assistant messages
    pub fn tool_call_count(&self) -> usize {
        self.messages.iter().map(|m| m.tool_calls.len()).sum()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_tool_message_correlates_call() {
        let msg = Message::tool("{\"ok\":true}", "call_1", "dice");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("dice"));
    }

    #[test]
    fn test_window_is_a_tail_view() {
        let mut conv = Conversation::new();
        for i in 0..25 {
            conv.push(Message::user(format!("turn {i}")));
        }

        let window = conv.window(20);
        assert_eq!(window.len(), 20);
        assert_eq!(window[0].content, "turn 5");
        assert_eq!(conv.len(), 25);
        assert_eq!(conv.window(100).len(), 25);
        assert!(conv.window(0).is_empty());
    }

    #[test]
    fn test_usage_totals() {
        let mut conv = Conversation::new();
        assert!(conv.usage_totals().is_none());

        conv.push(Message::assistant("a").with_usage(Some(TokenUsage::new(10, 5))));
        conv.push(Message::tool("{}", "call_1", "dice"));
        conv.push(Message::assistant("b").with_usage(Some(TokenUsage::new(20, 7))));

        let totals = conv.usage_totals().unwrap();
        assert_eq!(totals.prompt_tokens, 30);
        assert_eq!(totals.completion_tokens, 12);
        assert_eq!(totals.total_tokens, 42);
    }

    #[test]
    fn test_serialization_omits_empty_tool_calls() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert_eq!(json["role"], "assistant");
    }
}
