//! Prompt Builder
//!
//! Turns the run's transcript into the message list sent to the model:
//! system prompt and tool instructions on the first turn only, then a
//! sliding window over prior messages, then the user input.
//!
//! The window drops older messages outright. Tool results that fall out of
//! it are lost to the model; nothing is summarized.

use std::fmt::Write as _;

use crate::config::{AgentConfig, Framing};
use crate::message::{Conversation, Message};
use crate::tool::ToolDescriptor;

/// Builds prompts for one run
#[derive(Clone, Debug)]
pub struct PromptBuilder<'a> {
    system_prompt: Option<&'a str>,
    tools: &'a [ToolDescriptor],
    native_tools: bool,
    framing: Framing,
    max_history: usize,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a AgentConfig, tools: &'a [ToolDescriptor], native_tools: bool) -> Self {
        Self {
            system_prompt: config.system_prompt.as_deref(),
            tools,
            native_tools,
            framing: config.provider.framing(),
            max_history: config.max_history_messages,
        }
    }

    /// Prompt for the next model call
    pub fn build(&self, history: &Conversation, input: &str) -> Vec<Message> {
        let mut prompt = Vec::new();
        let first_turn = history.is_empty();

        if first_turn {
            if let Some(system) = self.system_prompt {
                prompt.push(Message::system(system));
            }
            if !self.native_tools {
                prompt.push(Message::system(self.instructions()));
            }
        }

        let window = history.window(self.max_history);
        if window.len() < history.len() {
            tracing::debug!(
                kept = window.len(),
                total = history.len(),
                "Trimming message history"
            );
        }
        prompt.extend_from_slice(window);
        prompt.push(Message::user(input));

        prompt
    }

    /// Tool manifest plus the response-format contract for this framing
    pub fn instructions(&self) -> String {
        let manifest = tool_manifest(self.tools);
        match self.framing {
            Framing::Tagged => format!("{TAGGED_PREAMBLE}\n{manifest}\n{TAGGED_RULES}"),
            Framing::Plain => format!("{PLAIN_PREAMBLE}\n\n{manifest}\n{PLAIN_RULES}"),
        }
    }
}

/// One line per tool: `- name(param: type [REQUIRED], ...): description`
/// followed by its JSON schema
pub fn tool_manifest(tools: &[ToolDescriptor]) -> String {
    let mut out = String::new();

    for tool in tools {
        let params = tool
            .parameters
            .properties
            .iter()
            .map(|(name, prop)| {
                let mark = if tool.parameters.is_required(name) { " [REQUIRED]" } else { "" };
                format!("{name}: {}{mark}", prop.param_type)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let schema = serde_json::to_string(&tool.parameters).unwrap_or_else(|_| "{}".into());

        let _ = writeln!(out, "- {}({params}): {}\n  Schema: {schema}", tool.name, tool.description);
    }

    out
}

const PLAIN_PREAMBLE: &str = "You have access to the following tools:";

const PLAIN_RULES: &str = r#"To use a tool, you MUST respond with ONLY a JSON object in this EXACT format:
{"tool_name": "name_of_tool", "tool_args": {"param1": "value1", "param2": value2}}

Do NOT add any explanation before or after the JSON. Just output the JSON.

If you don't need a tool, respond normally to the user's question."#;

const TAGGED_PREAMBLE: &str = "You are a helpful AI assistant with access to these tools:";

const TAGGED_RULES: &str = r#"RULES:
1. BE CONCISE. Keep <thinking> under 100 words.
2. To use a tool: <thinking>brief reason</thinking><message>{"tool_name":"name","tool_args":{...}}</message>
3. For final answers: <thinking>brief summary</thinking><message>your answer</message>
4. NO text outside the tags. NO repetition.
5. Provide exactly the parameters a tool requires, with matching names and types.
6. After a tool runs, check its result. If it has no "error" field, use it in your final answer and do not call the tool again. Retry only on an "error" result, at most 3 times.

EXAMPLE (tool call):
<thinking>Need weather data for coordinates.</thinking>
<message>{"tool_name":"getWeather","tool_args":{"latitude":-7.7,"longitude":109.0}}</message>

EXAMPLE (final answer):
<thinking>Tool returned weather data.</thinking>
<message>The weather is sunny, 28°C.</message>

BE BRIEF. NO REPETITION."#;
