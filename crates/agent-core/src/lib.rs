//! # agent-core
//!
//! Provider-agnostic agent loop with a fixed host-side tool set.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Session (one per connection, owns its Conversation)       │
//! │  ┌─────────────┐  ┌──────────────┐  ┌───────────────────┐  │
//! │  │  Reasoning  │  │ ToolExecutor │  │   LlmProvider     │  │
//! │  │    Loop     │──│ (closed set) │──│   (Strategy)      │  │
//! │  └─────────────┘  └──────────────┘  └───────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait lets the loop drive Gemini, Anthropic, or any other
//! tool-calling backend without branching on which one is active.

pub mod conversation;
pub mod error;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use conversation::{Conversation, Role, Turn, TurnContent};
pub use error::{AgentError, Result};
pub use provider::{LlmProvider, ProviderResponse, ResponsePart};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use session::{Session, SessionId};
pub use tool::{ToolCall, ToolExecutor, ToolKind, ToolResult, ToolSchema};
