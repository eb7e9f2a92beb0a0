//! # agent-core
//!
//! Agentic execution engine with provider-agnostic LLM abstraction and
//! remote tool servers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Agent                                │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ Manual loop  │  │   Prompt     │  │   LlmProvider          │  │
//! │  │ (sync/stream)│──│   Builder    │──│   (Strategy)           │  │
//! │  └──────┬───────┘  └──────────────┘  └────────────────────────┘  │
//! │         │          ┌──────────────┐  ┌────────────────────────┐  │
//! │         ├──────────│  Extractor   │  │   ToolRegistry         │  │
//! │         │          └──────────────┘  │   (ordered failover)   │  │
//! │         └────────────────────────────┴────────────────────────┘  │
//! │  ┌──────────────┐                                                │
//! │  │ Native loop  │── NativeToolCalling                            │
//! │  └──────────────┘                                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate touches the network; every external collaborator
//! is a trait implemented elsewhere.

pub mod config;
pub mod demux;
pub mod error;
pub mod event;
pub mod extract;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod reasoning;
pub mod state;
mod streaming;
pub mod tool;

#[cfg(test)]
mod testing;

pub use config::{AgentConfig, Framing, LlmSettings, ProviderKind};
pub use error::{AgentError, Result};
pub use event::{EventKind, EventStream, StreamEvent};
pub use message::{Conversation, Message, Role};
pub use provider::{LlmProvider, NativeToolCalling};
pub use reasoning::{Agent, AgentBuilder, AgentRun, RunMode};
pub use state::RunOutcome;
pub use tool::{ToolCall, ToolDescriptor, ToolEndpoint, ToolRegistry};
