//! # Open Agent
//!
//! A multi-provider, tool-using, retrieval-augmented agent framework with
//! lifecycle hooks, an observer bus, and a resumable workflow engine.
//!
//! ## Providers
//!
//! One backend per LLM wire format, all implementing the same [`provider::Provider`]
//! trait: [`provider::openai::OpenAiBackend`] (also backs Deepseek, Mistral, and
//! local OpenAI-compatible servers such as LM Studio, llama.cpp, and vLLM),
//! [`provider::anthropic::AnthropicBackend`], [`provider::gemini::GeminiBackend`],
//! and [`provider::ollama::OllamaBackend`] (Ollama's native `/api/chat`, distinct
//! from the OpenAI-compatibility shim).
//!
//! ## Example
//!
//! ```rust,no_run
//! use open_agent::provider::openai::OpenAiBackend;
//! use open_agent::{Agent, BaseUrl, ModelName};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> open_agent::Result<()> {
//!     let model = ModelName::new("gpt-4o-mini")?;
//!     let base_url = BaseUrl::new("https://api.openai.com/v1")?;
//!     let provider = OpenAiBackend::new(model, base_url, "sk-...")?;
//!     let agent = Agent::new(Arc::new(provider)).with_instructions("You are a helpful assistant");
//!
//!     let response = agent.chat("What's the capital of France?").await?;
//!     println!("{}", response.text());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **provider**: the `Provider` trait and one backend per LLM wire format.
//! - **agent**: the conversation loop — tool dispatch, hooks, observer events.
//! - **rag**: retrieval-augmented generation wrapping an `Agent` by composition.
//! - **workflow**: a resumable directed-graph execution engine.
//! - **types**: messages, content blocks, tool schemas, documents.
//! - **tools**: tool definition with automatic JSON schema generation.
//! - **hooks**: lifecycle interception (can veto/rewrite).
//! - **observer**: read-only synchronous event fan-out.
//! - **history**: chat history storage (in-memory and file-backed).
//! - **config**: local-server base-URL/model presets.
//! - **context**: token estimation and history truncation.
//! - **retry**: exponential backoff with jitter.
//! - **error**: the crate-wide `Error` enum and `Result` alias.
//! - **utils**: internal SSE parsing and tool-call-delta aggregation for the OpenAI backend.

mod agent;
mod config;
mod context;
mod error;
mod history;
mod hooks;
mod observer;
mod tools;
mod types;
mod utils;

pub mod provider;
pub mod rag;
pub mod retry;
pub mod workflow;

// --- Agent Core ---

pub use agent::{remove_delimited_content, Agent};

// --- Provider Configuration (local OpenAI-compatible servers) ---

pub use config::{get_base_url, get_model, OpenAiServerProfile};

// --- Context Management ---

pub use context::{estimate_tokens, is_approaching_limit, truncate_messages};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Chat History ---

pub use history::{ChatHistory, FileChatHistory, InMemoryChatHistory};

// --- Lifecycle Hooks ---

pub use hooks::{
    HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT,
};

// --- Observer Bus ---

pub use observer::{topics, Event, Observers};

// --- Tool System ---

pub use tools::{tool, Tool, ToolBuilder, Toolkit};

// --- Core Types ---

pub use types::{
    AttachmentKind, BaseUrl, ContentBlock, Document, Message, MessageRole, ModelName,
    PropertyType, Temperature, TextBlock, ToolProperty, ToolResultBlock, ToolUseBlock, Usage,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types and functions.
/// Import with `use open_agent::prelude::*;` to get everything you need for
/// typical agent construction and use.
pub mod prelude {
    pub use crate::provider::{DynProvider, Provider, StructuredSchema};
    pub use crate::rag::Rag;
    pub use crate::workflow::{Node, NodeOutcome, Workflow, WorkflowContext};
    pub use crate::{
        tool, Agent, ContentBlock, Error, HookDecision, Hooks, Message, PostToolUseEvent,
        PreToolUseEvent, Result, Tool, UserPromptSubmitEvent,
    };
}
