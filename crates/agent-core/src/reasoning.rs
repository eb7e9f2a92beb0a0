//! Reasoning Loop
//!
//! Implements the plan/act/observe cycle. Two interchangeable runners sit
//! behind [`AgentRun`]:
//!
//! - [`ManualAgent`]: prompts the model with tool instructions, extracts
//!   tool calls from its free-text output, invokes them, and loops until the
//!   model answers without a call or the iteration budget runs out.
//! - [`NativeAgent`]: hands the whole cycle to a provider with structured
//!   function calling.
//!
//! [`AgentBuilder`] picks one at construction time from the provider's
//! capabilities.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::AgentConfig;
use crate::demux::visible_answer;
use crate::error::{AgentError, Result};
use crate::event::{EventKind, EventSink, EventStream};
use crate::extract::ToolCallExtractor;
use crate::message::{Message, ResponseMetadata};
use crate::prompt::PromptBuilder;
use crate::provider::{FinishReason, LlmProvider, NativeToolCalling, TokenUsage, bounded};
use crate::state::{AgentRunState, RunOutcome};
use crate::tool::{ToolCall, ToolRegistry};

/// One way of executing a run
#[async_trait]
pub trait AgentRun: Send + Sync {
    /// Run to completion and return the aggregated outcome
    async fn invoke(&self, input: &str, cancel: &CancellationToken) -> Result<RunOutcome>;

    /// Run while emitting progress into `sink`. The caller emits the
    /// opening `start` and closing `done` events.
    async fn stream_into(&self, input: &str, sink: &EventSink, cancel: &CancellationToken) -> Result<()>;
}

/// Which runner an agent uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Manual,
    Native,
}

impl RunMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Native => "native",
        }
    }
}

/// Await `fut`, giving up on cancellation or after `limit`
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    operation: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AgentError::Cancelled),
        result = bounded(limit, operation, fut) => result,
    }
}

/// Runner that drives tool use itself
pub struct ManualAgent {
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) config: AgentConfig,
    pub(crate) extractor: ToolCallExtractor,
}

impl ManualAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
            extractor: ToolCallExtractor::new(),
        }
    }

    pub(crate) fn prompt_builder(&self) -> PromptBuilder<'_> {
        PromptBuilder::new(&self.config, self.tools.descriptors(), false)
    }

    /// Assistant message for model output, with any tool call attached
    pub(crate) fn assistant_message(
        &self,
        content: String,
        usage: Option<TokenUsage>,
        finish_reason: Option<&FinishReason>,
    ) -> Message {
        let metadata = ResponseMetadata {
            model_name: Some(self.config.generation.model.clone()),
            model_provider: Some(self.config.provider.as_str().to_string()),
            finish_reason: finish_reason.map(|r| r.as_str().to_string()),
        };
        self.extractor
            .attach(Message::assistant(content).with_usage(usage).with_metadata(metadata))
    }

    pub(crate) fn log_output(&self, iteration: usize, content: &str) {
        if self.config.verbose {
            tracing::info!(iteration, output = content, "Model output");
        } else {
            tracing::debug!(iteration, chars = content.len(), "Model output");
        }
    }

    /// Invoke one tool call and wrap its result as a tool message
    pub(crate) async fn invoke_tool(&self, call: &ToolCall, cancel: &CancellationToken) -> Result<Message> {
        if self.config.verbose {
            tracing::info!(tool = %call.name, args = ?call.args, "Invoking tool");
        } else {
            tracing::debug!(tool = %call.name, "Invoking tool");
        }

        let result = guarded(cancel, None, "tool call", self.tools.invoke(&call.name, &call.args)).await?;
        let content = serde_json::to_string(&result)?;
        Ok(Message::tool(content, call.id.clone(), call.name.clone()))
    }

    pub(crate) fn record_answer(&self, state: &mut AgentRunState, raw: &str) {
        state.final_message = Some(visible_answer(self.config.provider.framing(), raw));
    }

    pub(crate) fn log_budget(&self, state: &AgentRunState) {
        if !state.is_done() {
            tracing::warn!(
                iterations = state.iterations,
                "Iteration budget exhausted without a final answer"
            );
        }
    }
}

#[async_trait]
impl AgentRun for ManualAgent {
    async fn invoke(&self, input: &str, cancel: &CancellationToken) -> Result<RunOutcome> {
        let mut state = AgentRunState::new(input);
        let prompts = self.prompt_builder();
        let max_iterations = self.config.max_iterations;

        while state.iterations < max_iterations {
            let iteration = state.next_iteration();
            tracing::debug!(iteration, max_iterations, "Iteration");

            let prompt = prompts.build(&state.messages, &state.input);
            let completion = guarded(
                cancel,
                self.config.call_timeout,
                "model call",
                self.provider.complete(&prompt, &self.config.generation),
            )
            .await?;
            self.log_output(iteration, &completion.content);

            let message = self.assistant_message(
                completion.content.clone(),
                completion.usage,
                completion.finish_reason.as_ref(),
            );
            let calls = message.tool_calls.clone();
            state.messages.push(message);

            if calls.is_empty() {
                self.record_answer(&mut state, &completion.content);
                break;
            }

            tracing::debug!(iteration, count = calls.len(), "Executing tool calls");
            for call in &calls {
                let result = self.invoke_tool(call, cancel).await?;
                state.messages.push(result);
            }
        }

        self.log_budget(&state);
        Ok(state.finish())
    }

    async fn stream_into(&self, input: &str, sink: &EventSink, cancel: &CancellationToken) -> Result<()> {
        crate::streaming::stream_manual(self, input, sink, cancel).await
    }
}

/// Runner delegating the cycle to the provider's function calling
pub struct NativeAgent {
    executor: Arc<dyn NativeToolCalling>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl NativeAgent {
    pub fn new(executor: Arc<dyn NativeToolCalling>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            executor,
            tools,
            config,
        }
    }
}

#[async_trait]
impl AgentRun for NativeAgent {
    async fn invoke(&self, input: &str, cancel: &CancellationToken) -> Result<RunOutcome> {
        let mut state = AgentRunState::new(input);
        let prompt = PromptBuilder::new(&self.config, self.tools.descriptors(), true)
            .build(&state.messages, &state.input);

        // Rounds are bounded individually inside the executor
        let run = guarded(
            cancel,
            None,
            "native tool-calling run",
            self.executor.run_with_tools(
                &prompt,
                &self.tools,
                &self.config.generation,
                self.config.call_timeout,
            ),
        )
        .await?;

        if self.config.verbose {
            tracing::info!(output = %run.completion.content, iterations = run.iterations, "Native run finished");
        }

        if run.transcript.is_empty() {
            state
                .messages
                .push(Message::assistant(run.completion.content.clone()).with_usage(run.completion.usage));
        } else {
            state.messages.extend(run.transcript);
        }
        state.iterations = run.iterations.max(1);
        state.final_message = Some(run.completion.content);

        Ok(state.finish())
    }

    async fn stream_into(&self, input: &str, sink: &EventSink, cancel: &CancellationToken) -> Result<()> {
        let outcome = self.invoke(input, cancel).await?;
        let answer = outcome.final_answer.unwrap_or_default();
        sink.emit(EventKind::message_chunk(answer, true)).await
    }
}

/// The agent: one runner plus its identity for logging
pub struct Agent {
    runner: Arc<dyn AgentRun>,
    mode: RunMode,
    request_id: String,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("mode", &self.mode)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("agent_run", request_id = %self.request_id, mode = self.mode.as_str())
    }

    /// Run synchronously
    pub async fn run(&self, input: &str, cancel: &CancellationToken) -> Result<RunOutcome> {
        async {
            tracing::info!("Starting run");
            let outcome = self.runner.invoke(input, cancel).await;
            match &outcome {
                Ok(outcome) => tracing::info!(
                    iterations = outcome.iteration_count,
                    tool_calls = outcome.tool_call_count,
                    complete = outcome.is_complete(),
                    "Run finished"
                ),
                Err(e) => tracing::error!("Run failed: {}", e),
            }
            outcome
        }
        .instrument(self.span())
        .await
    }

    /// Run on a spawned task, streaming events through a channel holding
    /// at most `buffer` events.
    ///
    /// The stream opens with `start` and ends with `done`; a failed run
    /// emits `error` just before `done`. A cancelled run emits nothing more
    /// and the stream simply ends.
    pub fn run_stream(&self, input: impl Into<String>, cancel: CancellationToken, buffer: usize) -> EventStream {
        self.run_stream_with(input, cancel, buffer, Vec::new())
    }

    /// Like [`Agent::run_stream`], emitting `preamble` right after `start`
    pub fn run_stream_with(
        &self,
        input: impl Into<String>,
        cancel: CancellationToken,
        buffer: usize,
        preamble: Vec<EventKind>,
    ) -> EventStream {
        let (sink, stream) = EventSink::channel(buffer, cancel.clone());
        let runner = Arc::clone(&self.runner);
        let input = input.into();

        let task = async move {
            let result = async {
                sink.emit(EventKind::Start { input: input.clone() }).await?;
                for event in preamble {
                    sink.emit(event).await?;
                }
                runner.stream_into(&input, &sink, &cancel).await
            }
            .await;

            match result {
                Ok(()) => {
                    tracing::info!(steps = sink.steps(), "Stream finished");
                }
                Err(AgentError::Cancelled) => {
                    tracing::info!("Stream cancelled");
                    return;
                }
                Err(e) => {
                    tracing::error!("Stream failed: {}", e);
                    if sink
                        .emit(EventKind::Error { message: e.user_message() })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }

            let total_steps = sink.steps();
            let _ = sink.emit(EventKind::Done { total_steps }).await;
        };

        tokio::spawn(task.instrument(self.span()));
        stream
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    native: Option<Arc<dyn NativeToolCalling>>,
    tools: ToolRegistry,
    config: AgentConfig,
    request_id: Option<String>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            native: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
            request_id: None,
        }
    }

    /// Text-generation provider, used by the manual loop
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Structured function-calling executor
    #[must_use]
    pub fn native(mut self, executor: Arc<dyn NativeToolCalling>) -> Self {
        self.native = Some(executor);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Validate the configuration and choose the runner
    pub fn build(self) -> Result<Agent> {
        self.config.validate()?;

        let tools = Arc::new(self.tools.with_attempt_timeout(self.config.call_timeout));
        let request_id = self
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let native = self
            .native
            .filter(|_| self.config.provider.supports_native_tools());

        let (runner, mode): (Arc<dyn AgentRun>, RunMode) = match (native, self.provider) {
            (Some(executor), _) => (
                Arc::new(NativeAgent::new(executor, tools, self.config)),
                RunMode::Native,
            ),
            (None, Some(provider)) => (
                Arc::new(ManualAgent::new(provider, tools, self.config)),
                RunMode::Manual,
            ),
            (None, None) => {
                return Err(AgentError::Config("no LLM provider configured".into()));
            }
        };

        tracing::debug!(mode = mode.as_str(), %request_id, "Agent created");
        Ok(Agent {
            runner,
            mode,
            request_id,
        })
    }
}
