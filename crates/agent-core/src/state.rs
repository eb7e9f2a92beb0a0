//! Run State
//!
//! [`AgentRunState`] is owned by the loop driving one run and never shared;
//! [`RunOutcome`] is what the caller gets back.

use serde::{Deserialize, Serialize};

use crate::message::{Conversation, Message};
use crate::provider::TokenUsage;

/// Mutable state of one run. Single writer: the owning loop.
#[derive(Clone, Debug)]
pub struct AgentRunState {
    /// The user input this run answers
    pub input: String,

    /// Assistant and tool messages produced so far
    pub messages: Conversation,

    /// Set once the model answers without a tool call
    pub final_message: Option<String>,

    /// Iterations started so far
    pub iterations: usize,
}

impl AgentRunState {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            messages: Conversation::new(),
            final_message: None,
            iterations: 0,
        }
    }

    /// Begin the next iteration and return its 1-based number
    pub const fn next_iteration(&mut self) -> usize {
        self.iterations += 1;
        self.iterations
    }

    pub fn is_done(&self) -> bool {
        self.final_message.is_some()
    }

    pub fn finish(self) -> RunOutcome {
        RunOutcome {
            usage_totals: self.messages.usage_totals(),
            tool_call_count: self.messages.tool_call_count(),
            iteration_count: self.iterations,
            final_answer: self.final_message,
            messages: self.messages.into_messages(),
            input: self.input,
        }
    }
}

/// Result of a synchronous run.
///
/// A run that exhausted its iteration budget has no `final_answer`; that is
/// how incompleteness is signalled, not through an error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOutcome {
    pub input: String,

    /// Full transcript of assistant and tool messages
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,

    /// Summed token usage, when the provider reported any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_totals: Option<TokenUsage>,

    pub iteration_count: usize,

    pub tool_call_count: usize,
}

impl RunOutcome {
    pub const fn is_complete(&self) -> bool {
        self.final_answer.is_some()
    }

    /// Final answer, or the last transcript message when the budget ran out
    pub fn display_message(&self) -> Option<&str> {
        self.final_answer
            .as_deref()
            .or_else(|| self.messages.last().map(|m| m.content.as_str()))
    }
}
