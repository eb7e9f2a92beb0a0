//! Stream Events
//!
//! Events a streaming run emits, and the bounded channel that carries them
//! to the transport layer. Every event serializes flat:
//! `{"type": "...", "timestamp": "...", ...payload}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::tool::ToolCall;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// One event of a streaming run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl StreamEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Event payloads
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The run has begun
    Start { input: String },

    /// Tool servers answering their health probe, out of those requested
    ServersChecked {
        available_servers: Vec<String>,
        total_servers: usize,
    },

    /// First message content of a generation is about to arrive
    StreamStart,

    ThinkingStart,

    ThinkingChunk { chunk: String, is_final: bool },

    /// The thinking block closed; `content` is all of it
    ThinkingEnd { content: String },

    MessageChunk { chunk: String, is_final: bool },

    /// Loop progress
    NodeExecution(NodeExecution),

    /// The run failed
    Error { message: String },

    /// The model answered without a tool call
    StreamEnd,

    /// Always the last event of a run that was not cancelled
    Done { total_steps: usize },
}

impl EventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::ServersChecked { .. } => "servers_checked",
            Self::StreamStart => "stream_start",
            Self::ThinkingStart => "thinking_start",
            Self::ThinkingChunk { .. } => "thinking_chunk",
            Self::ThinkingEnd { .. } => "thinking_end",
            Self::MessageChunk { .. } => "message_chunk",
            Self::NodeExecution(_) => "node_execution",
            Self::Error { .. } => "error",
            Self::StreamEnd => "stream_end",
            Self::Done { .. } => "done",
        }
    }

    pub fn message_chunk(chunk: impl Into<String>, is_final: bool) -> Self {
        Self::MessageChunk {
            chunk: chunk.into(),
            is_final,
        }
    }

    pub fn thinking_chunk(chunk: impl Into<String>, is_final: bool) -> Self {
        Self::ThinkingChunk {
            chunk: chunk.into(),
            is_final,
        }
    }
}

/// Loop stage reported by a `node_execution` event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    AgentStart,
    AgentPlanning,
    ToolExecutionStart,
    ToolExecutionEnd,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node: Node,
    pub step: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Map<String, Value>>,

    /// Serialized tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
}

impl NodeExecution {
    pub const fn new(node: Node, step: usize) -> Self {
        Self {
            node,
            step,
            tool_calls: None,
            tool_name: None,
            tool_args: None,
            tool_result: None,
        }
    }

    pub fn planning(step: usize, calls: &[ToolCall]) -> Self {
        Self {
            tool_calls: Some(calls.to_vec()),
            ..Self::new(Node::AgentPlanning, step)
        }
    }

    pub fn tool_start(step: usize, call: &ToolCall) -> Self {
        Self {
            tool_name: Some(call.name.clone()),
            tool_args: Some(call.args.clone()),
            ..Self::new(Node::ToolExecutionStart, step)
        }
    }

    pub fn tool_end(step: usize, call: &ToolCall, result: impl Into<String>) -> Self {
        Self {
            tool_name: Some(call.name.clone()),
            tool_result: Some(result.into()),
            ..Self::new(Node::ToolExecutionEnd, step)
        }
    }
}

/// Events as the transport layer consumes them
pub type EventStream = ReceiverStream<StreamEvent>;

/// Producer side of a run's event channel.
///
/// Sends block while the channel is full, so a slow consumer slows the run
/// instead of losing events.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    steps: AtomicUsize,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) -> Self {
        Self {
            tx,
            cancel,
            steps: AtomicUsize::new(0),
        }
    }

    /// Bounded channel of `capacity` events (at least 1)
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, cancel), ReceiverStream::new(rx))
    }

    /// Deliver one event. Fails with [`AgentError::Cancelled`] once the run
    /// is cancelled or the consumer has gone away.
    pub async fn emit(&self, kind: EventKind) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let event = StreamEvent::now(kind);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AgentError::Cancelled),
            sent = self.tx.send(event) => sent.map_err(|_| AgentError::Cancelled),
        }
    }

    /// Current step number, then advance
    pub fn next_step(&self) -> usize {
        self.steps.fetch_add(1, Ordering::Relaxed)
    }

    /// Steps taken so far
    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_flat_serialization() {
        let event = StreamEvent::now(EventKind::message_chunk("hi", false));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_chunk");
        assert_eq!(json["chunk"], "hi");
        assert_eq!(json["is_final"], false);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_unit_variants() {
        let json = serde_json::to_value(StreamEvent::now(EventKind::StreamEnd)).unwrap();
        assert_eq!(json["type"], "stream_end");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_node_execution_serialization() {
        let call = ToolCall::with_id("call_1", "dice", json!({"sides": 6}).as_object().cloned().unwrap());
        let event = StreamEvent::now(EventKind::NodeExecution(NodeExecution::tool_start(3, &call)));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_execution");
        assert_eq!(json["node"], "tool_execution_start");
        assert_eq!(json["step"], 3);
        assert_eq!(json["tool_name"], "dice");
        assert_eq!(json["tool_args"], json!({"sides": 6}));
        assert!(json.get("tool_result").is_none());

        let back: StreamEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_names() {
        assert_eq!(EventKind::Done { total_steps: 1 }.name(), "done");
        assert_eq!(EventKind::ThinkingStart.name(), "thinking_start");
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut stream) = EventSink::channel(4, CancellationToken::new());
        sink.emit(EventKind::StreamStart).await.unwrap();
        sink.emit(EventKind::message_chunk("a", false)).await.unwrap();
        drop(sink);

        let names: Vec<_> = stream.by_ref().map(|e| e.name()).collect().await;
        assert_eq!(names, ["stream_start", "message_chunk"]);
    }

    #[tokio::test]
    async fn test_sink_stops_after_cancel() {
        let cancel = CancellationToken::new();
        let (sink, _stream) = EventSink::channel(1, cancel.clone());
        sink.emit(EventKind::StreamStart).await.unwrap();

        cancel.cancel();
        assert!(matches!(sink.emit(EventKind::StreamEnd).await, Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn test_sink_fails_when_consumer_gone() {
        let (sink, stream) = EventSink::channel(1, CancellationToken::new());
        drop(stream);
        assert!(matches!(sink.emit(EventKind::StreamEnd).await, Err(AgentError::Cancelled)));
    }

    #[test]
    fn test_step_counter() {
        let (sink, _stream) = EventSink::channel(1, CancellationToken::new());
        assert_eq!(sink.next_step(), 0);
        assert_eq!(sink.next_step(), 1);
        assert_eq!(sink.steps(), 2);
    }
}
