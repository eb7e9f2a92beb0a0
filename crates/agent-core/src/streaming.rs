//! Streaming Agent Loop
//!
//! Same iteration structure as the synchronous loop, but each generation is
//! consumed token by token and turned into events as it arrives. Tool calls
//! are extracted from the full raw text once the model stream closes.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::demux::consumer_for;
use crate::error::{AgentError, Result};
use crate::event::{EventKind, EventSink, Node, NodeExecution};
use crate::message::Message;
use crate::provider::TokenUsage;
use crate::reasoning::{ManualAgent, guarded};
use crate::state::AgentRunState;
use crate::tool::ToolCall;

/// Raw text and usage of one streamed generation
struct Generation {
    raw: String,
    usage: Option<TokenUsage>,
}

async fn emit_node(sink: &EventSink, node: NodeExecution) -> Result<()> {
    sink.emit(EventKind::NodeExecution(node)).await
}

impl ManualAgent {
    /// Stream one generation through the framing's consumer, forwarding
    /// every event it produces
    async fn stream_generation(
        &self,
        state: &AgentRunState,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        let prompt = self.prompt_builder().build(&state.messages, &state.input);
        let limit = self.config.call_timeout;

        let mut chunks = guarded(
            cancel,
            limit,
            "model stream",
            self.provider.complete_stream(&prompt, &self.config.generation),
        )
        .await?;

        let mut consumer = consumer_for(self.config.provider.framing());
        let mut usage = None;

        loop {
            let next = guarded(cancel, limit, "model stream chunk", async {
                Ok::<_, AgentError>(chunks.next().await)
            })
            .await?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            for event in consumer.consume(&chunk.delta) {
                sink.emit(event).await?;
            }
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        Ok(Generation {
            raw: consumer.raw().to_string(),
            usage,
        })
    }
}

/// Announce every call, invoke them in order, then report every result
async fn execute_tools(
    agent: &ManualAgent,
    calls: &[ToolCall],
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<Vec<Message>> {
    for call in calls {
        emit_node(sink, NodeExecution::tool_start(sink.next_step(), call)).await?;
    }

    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(agent.invoke_tool(call, cancel).await?);
    }

    for (call, result) in calls.iter().zip(&results) {
        emit_node(sink, NodeExecution::tool_end(sink.next_step(), call, result.content.clone())).await?;
    }
    Ok(results)
}

/// Manual plan/act/observe loop emitting events into `sink`
pub(crate) async fn stream_manual(
    agent: &ManualAgent,
    input: &str,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut state = AgentRunState::new(input);
    let max_iterations = agent.config.max_iterations;

    while state.iterations < max_iterations {
        let iteration = state.next_iteration();
        tracing::debug!(iteration, max_iterations, "Streaming iteration");
        emit_node(sink, NodeExecution::new(Node::AgentStart, sink.next_step())).await?;

        let generation = agent.stream_generation(&state, sink, cancel).await?;
        agent.log_output(iteration, &generation.raw);

        let message = agent.assistant_message(generation.raw.clone(), generation.usage, None);
        let calls = message.tool_calls.clone();
        state.messages.push(message);

        if calls.is_empty() {
            sink.emit(EventKind::message_chunk("", true)).await?;
            sink.emit(EventKind::StreamEnd).await?;
            agent.record_answer(&mut state, &generation.raw);
            break;
        }

        emit_node(sink, NodeExecution::planning(sink.next_step(), &calls)).await?;

        let results = execute_tools(agent, &calls, sink, cancel).await?;
        state.messages.extend(results);
    }

    agent.log_budget(&state);
    Ok(())
}
