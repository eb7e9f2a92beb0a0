//! Tool-Call Extraction
//!
//! Models without native function calling announce tool use in free text,
//! and different local models get the syntax wrong in different ways. The
//! extractor runs an ordered list of pattern matchers over the output, from
//! the most structured to the most heuristic; the first match wins.
//!
//! Argument objects must be flat: matchers stop at the first `}` so a
//! nested object never produces a greedy mis-parse.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::LazyLock;

use crate::message::Message;
use crate::tool::ToolCall;

static JSON_ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"tool_name"\s*:\s*"([^"]+)"\s*,\s*"tool_args"\s*:\s*(\{[^}]*\})\s*\}"#)
        .expect("envelope pattern")
});

static FUNCTION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"to=(?:tool\.)?(\w+)\s+json\s*\n?\s*(\{[^}]+\})").expect("marker pattern")
});

static FENCED_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"to=tool\.(\w+)\s+code<\|message\|>(\{[^}]+\})").expect("fenced pattern")
});

static MESSAGE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<message>(\{[^}]+\})").expect("message block pattern"));

static CONTEXT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:to=tool\.|tool_name["\s:]+)(\w+)"#).expect("tool name pattern")
});

/// Tool name and raw argument text pulled out of model output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCall<'t> {
    pub name: &'t str,
    pub args: &'t str,
}

/// One entry in the matcher chain
pub struct PatternMatcher {
    /// Identifies the matcher in logs and tests
    pub name: &'static str,
    capture: fn(&str) -> Option<RawCall<'_>>,
}

impl PatternMatcher {
    pub fn capture<'t>(&self, content: &'t str) -> Option<RawCall<'t>> {
        (self.capture)(content)
    }
}

impl std::fmt::Debug for PatternMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternMatcher").field("name", &self.name).finish()
    }
}

fn two_groups<'t>(re: &Regex, content: &'t str) -> Option<RawCall<'t>> {
    let caps = re.captures(content)?;
    Some(RawCall {
        name: caps.get(1)?.as_str(),
        args: caps.get(2)?.as_str(),
    })
}

fn json_envelope(content: &str) -> Option<RawCall<'_>> {
    two_groups(&JSON_ENVELOPE, content)
}

fn function_marker(content: &str) -> Option<RawCall<'_>> {
    two_groups(&FUNCTION_MARKER, content)
}

fn fenced_marker(content: &str) -> Option<RawCall<'_>> {
    two_groups(&FENCED_MARKER, content)
}

/// Last resort: a bare argument object inside `<message>`, named by
/// whatever tool reference appears elsewhere in the text
fn message_block(content: &str) -> Option<RawCall<'_>> {
    let args = MESSAGE_BLOCK.captures(content)?.get(1)?.as_str();
    let name = CONTEXT_NAME.captures(content)?.get(1)?.as_str();
    Some(RawCall { name, args })
}

/// Ordered matcher chain for free-text tool calls
#[derive(Debug)]
pub struct ToolCallExtractor {
    matchers: Vec<PatternMatcher>,
}

impl Default for ToolCallExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCallExtractor {
    pub fn new() -> Self {
        Self {
            matchers: vec![
                PatternMatcher { name: "json_envelope", capture: json_envelope },
                PatternMatcher { name: "function_marker", capture: function_marker },
                PatternMatcher { name: "fenced_marker", capture: fenced_marker },
                PatternMatcher { name: "message_block", capture: message_block },
            ],
        }
    }

    pub fn matchers(&self) -> &[PatternMatcher] {
        &self.matchers
    }

    /// First matcher that recognises `content`, with what it captured
    pub fn find<'t>(&self, content: &'t str) -> Option<(&'static str, RawCall<'t>)> {
        let content = content.trim();
        self.matchers
            .iter()
            .find_map(|m| m.capture(content).map(|raw| (m.name, raw)))
    }

    /// Tool call embedded in `content`, if any.
    ///
    /// A structural match whose argument text is not a JSON object yields
    /// no call; the output is then treated as a final answer.
    pub fn extract(&self, content: &str) -> Option<ToolCall> {
        let (matcher, raw) = self.find(content)?;

        let Ok(mut args) = serde_json::from_str::<Map<String, Value>>(raw.args) else {
            tracing::debug!(matcher, args = raw.args, "Matched tool call has malformed arguments");
            return None;
        };
        coerce_numeric_strings(&mut args);

        tracing::debug!(matcher, tool = raw.name, "Extracted tool call");
        Some(ToolCall::new(raw.name, args))
    }

    /// Assistant message for `content` with its extracted call attached
    pub fn attach(&self, message: Message) -> Message {
        match self.extract(&message.content) {
            Some(call) => message.with_tool_calls(vec![call]),
            None => message,
        }
    }
}

/// Top-level string arguments that parse as a float become numbers.
///
/// Applies to every such string, including ones meant literally (zip codes,
/// phone numbers).
pub fn coerce_numeric_strings(args: &mut Map<String, Value>) {
    for value in args.values_mut() {
        let Value::String(text) = value else {
            continue;
        };
        let number = text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64);
        if let Some(number) = number {
            *value = Value::Number(number);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_envelope() {
        let extractor = ToolCallExtractor::new();
        let content = r#"{"tool_name":"x","tool_args":{"a":1}}"#;

        let (matcher, _) = extractor.find(content).unwrap();
        assert_eq!(matcher, "json_envelope");

        let call = extractor.extract(content).unwrap();
        assert_eq!(call.name, "x");
        assert_eq!(Value::Object(call.args), json!({"a": 1}));
        assert_eq!(call.kind, "tool_call");
    }

    #[test]
    fn test_only_envelope_fires_for_canonical_input() {
        let extractor = ToolCallExtractor::new();
        let content = r#"{"tool_name":"x","tool_args":{"a":1}}"#;
        let fired: Vec<_> = extractor
            .matchers()
            .iter()
            .filter(|m| m.capture(content).is_some())
            .map(|m| m.name)
            .collect();
        assert_eq!(fired, ["json_envelope"]);
    }

    #[test]
    fn test_numeric_coercion_every_matcher() {
        let extractor = ToolCallExtractor::new();
        let inputs = [
            r#"{"tool_name": "x", "tool_args": {"a": "3.5"}}"#,
            "to=tool.x json\n{\"a\": \"3.5\"}",
            r#"to=tool.x code<|message|>{"a":"3.5"}"#,
            r#"<thinking>use tool_name: x</thinking><message>{"a":"3.5"}</message>"#,
        ];

        for input in inputs {
            let call = extractor.extract(input).unwrap_or_else(|| panic!("no call in {input}"));
            assert_eq!(call.name, "x", "{input}");
            assert_eq!(call.args["a"], json!(3.5), "{input}");
            assert!(call.args["a"].is_f64());
        }
    }

    #[test]
    fn test_function_marker_without_namespace() {
        let call = ToolCallExtractor::new()
            .extract(r#"<|channel|>commentary to=getWeather json {"city":"Oslo"}"#)
            .unwrap();
        assert_eq!(call.name, "getWeather");
        assert_eq!(call.args["city"], "Oslo");
    }

    #[test]
    fn test_envelope_wins_over_later_matchers() {
        let content = r#"to=tool.other json {"b":2} {"tool_name":"first","tool_args":{"a":1}}"#;
        let call = ToolCallExtractor::new().extract(content).unwrap();
        assert_eq!(call.name, "first");
    }

    #[test]
    fn test_no_match_is_terminal() {
        let extractor = ToolCallExtractor::new();
        assert!(extractor.extract("The answer is 42.").is_none());
        assert!(extractor.extract("<message>{\"a\":1}</message>").is_none());

        let msg = extractor.attach(Message::assistant("plain answer"));
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_message_block_needs_explicit_tool_reference() {
        let extractor = ToolCallExtractor::new();
        let bare = r#"<thinking>try dns_lookup here</thinking><message>{"host":"example.com"}</message>"#;
        assert!(extractor.extract(bare).is_none());

        let named = r#"<thinking>tool_name: dns_lookup</thinking><message>{"host":"example.com"}</message>"#;
        let call = extractor.extract(named).unwrap();
        assert_eq!(call.name, "dns_lookup");
        assert_eq!(call.args["host"], "example.com");
    }

    #[test]
    fn test_nested_args_not_extracted() {
        let content = r#"{"tool_name":"x","tool_args":{"outer":{"inner":1}}}"#;
        assert!(ToolCallExtractor::new().extract(content).is_none());
    }

    #[test]
    fn test_malformed_args_soft_failure() {
        let content = r#"to=tool.x json {a: 1}"#;
        let extractor = ToolCallExtractor::new();
        assert!(extractor.find(content).is_some());
        assert!(extractor.extract(content).is_none());
    }

    #[test]
    fn test_coercion_leaves_non_numbers() {
        let mut args = json!({"zip": "02134", "city": "Boston", "n": 3, "flag": true, "nan": "NaN"})
            .as_object()
            .cloned()
            .unwrap();
        coerce_numeric_strings(&mut args);

        assert_eq!(args["zip"], json!(2134.0));
        assert_eq!(args["city"], "Boston");
        assert_eq!(args["n"], 3);
        assert_eq!(args["flag"], true);
        assert_eq!(args["nan"], "NaN");
    }

    #[test]
    fn test_attach_gives_unique_ids() {
        let extractor = ToolCallExtractor::new();
        let content = r#"{"tool_name":"x","tool_args":{}}"#;
        let a = extractor.attach(Message::assistant(content));
        let b = extractor.attach(Message::assistant(content));
        assert_eq!(a.tool_calls.len(), 1);
        assert_ne!(a.tool_calls[0].id, b.tool_calls[0].id);
    }
}
