//! Test doubles: a scripted model and in-memory tool servers.

use async_trait::async_trait;
use futures::stream;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, NativeRun, NativeToolCalling,
    ProviderInfo, StreamChunk, TokenUsage, bounded,
};
use crate::tool::{ToolDescriptor, ToolEndpoint, ToolRegistry};

/// Provider replaying canned outputs, one per call
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Vec<String>>>,
    repeat: Option<Vec<String>>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn from_script(script: VecDeque<Vec<String>>, repeat: Option<Vec<String>>) -> Self {
        Self {
            script: Mutex::new(script),
            repeat,
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// One whole-text output per call, in order
    pub fn sequence<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_script(outputs.into_iter().map(|o| vec![o.into()]).collect(), None)
    }

    /// The same output on every call
    pub fn repeating(output: impl Into<String>) -> Self {
        Self::from_script(VecDeque::new(), Some(vec![output.into()]))
    }

    /// Streamed outputs given as explicit chunks
    pub fn chunked(outputs: Vec<Vec<&str>>) -> Self {
        Self::from_script(
            outputs
                .into_iter()
                .map(|chunks| chunks.into_iter().map(String::from).collect())
                .collect(),
            None,
        )
    }

    /// Every call fails with a provider error
    pub fn failing(message: impl Into<String>) -> Self {
        let mut provider = Self::from_script(VecDeque::new(), None);
        provider.failure = Some(message.into());
        provider
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next_output(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(AgentError::Provider(message.clone()));
        }

        let next = self
            .script
            .lock()
            .map_err(|_| AgentError::Provider("script poisoned".into()))?
            .pop_front();
        next.or_else(|| self.repeat.clone())
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "scripted".into(),
            supports_streaming: true,
            supports_tools: false,
        }
    }

    async fn complete(&self, _messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let output = self.next_output().await?.concat();
        let mut completion = Completion::text(output, options.model.clone());
        completion.usage = Some(TokenUsage::new(10, 5));
        Ok(completion)
    }

    async fn complete_stream(
        &self,
        _messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let chunks = self.next_output().await?;
        let mut items: Vec<Result<StreamChunk>> = chunks.into_iter().map(|c| Ok(StreamChunk::delta(c))).collect();
        items.push(Ok(StreamChunk {
            delta: String::new(),
            done: true,
            usage: Some(TokenUsage::new(10, 5)),
        }));
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Native executor that calls one tool, then answers
pub struct ScriptedNative {
    pub tool: Option<(String, Map<String, Value>)>,
    pub answer: String,
    /// Latency of each model round
    pub delay: Option<Duration>,
}

impl ScriptedNative {
    async fn model_round(&self, call_timeout: Option<Duration>) -> Result<()> {
        let Some(delay) = self.delay else {
            return Ok(());
        };
        bounded(call_timeout, "model call", async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl NativeToolCalling for ScriptedNative {
    async fn run_with_tools(
        &self,
        _messages: &[Message],
        tools: &ToolRegistry,
        options: &GenerationOptions,
        call_timeout: Option<Duration>,
    ) -> Result<NativeRun> {
        let mut transcript = Vec::new();
        let mut iterations = 1;

        self.model_round(call_timeout).await?;
        if let Some((name, args)) = &self.tool {
            let call = crate::tool::ToolCall::new(name.clone(), args.clone());
            let result = tools.invoke(name, args).await?;
            transcript.push(Message::assistant("").with_tool_calls(vec![call.clone()]));
            transcript.push(Message::tool(result.to_string(), call.id, name.clone()));
            iterations += 1;
            self.model_round(call_timeout).await?;
        }
        transcript.push(Message::assistant(self.answer.clone()));

        Ok(NativeRun {
            completion: Completion::text(self.answer.clone(), options.model.clone()),
            transcript,
            iterations,
        })
    }
}

#[derive(Clone, Debug)]
enum Behavior {
    Answer(Value),
    Fail,
    Unknown,
}

/// In-memory tool server
#[derive(Debug)]
pub struct MockEndpoint {
    url: String,
    healthy: bool,
    behavior: Behavior,
    tools: Vec<ToolDescriptor>,
    delay: Option<Duration>,
    invocations: AtomicUsize,
    last_args: Mutex<Option<Map<String, Value>>>,
}

impl MockEndpoint {
    fn with_behavior(url: &str, behavior: Behavior) -> Self {
        Self {
            url: url.to_string(),
            healthy: true,
            behavior,
            tools: Vec::new(),
            delay: None,
            invocations: AtomicUsize::new(0),
            last_args: Mutex::new(None),
        }
    }

    /// Every invocation returns `result`
    pub fn answering(url: &str, result: Value) -> Self {
        Self::with_behavior(url, Behavior::Answer(result))
    }

    /// Every call fails; the catalog cannot be fetched either
    pub fn failing(url: &str) -> Self {
        Self::with_behavior(url, Behavior::Fail)
    }

    /// Knows no tools at all
    pub fn unknown_tools(url: &str) -> Self {
        Self::with_behavior(url, Behavior::Unknown)
    }

    #[must_use]
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Option<Map<String, Value>> {
        self.last_args.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl ToolEndpoint for MockEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn health(&self) -> bool {
        self.healthy
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        match self.behavior {
            Behavior::Fail => Err(AgentError::ToolExecution(format!("{} unreachable", self.url))),
            _ => Ok(self.tools.clone()),
        }
    }

    async fn invoke(&self, name: &str, args: &Map<String, Value>) -> Result<Value> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_args.lock() {
            *last = Some(args.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Answer(value) => Ok(value.clone()),
            Behavior::Fail => Err(AgentError::ToolExecution(format!("{} unreachable", self.url))),
            Behavior::Unknown => Err(AgentError::ToolNotFound(name.to_string())),
        }
    }
}
