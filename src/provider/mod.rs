//! The provider abstraction: a uniform `chat`/`stream`/`structured` contract
//! implemented by one backend per LLM wire format (§4.2).
//!
//! Message mapping is backend-specific (role names, system-prompt placement,
//! tool-call/result shape, stream framing); everything above this trait object
//! boundary — the agent core, RAG, workflow engine — only ever sees the
//! provider-independent [`crate::types::Message`] sum type.

pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod stream;

use crate::tools::Tool;
use crate::types::Message;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub use stream::TextStream;

/// Describes the target shape for a `structured` call: a name (used as the
/// forced tool/function name on backends that implement structured output via
/// forced tool-calling) and its JSON schema.
#[derive(Debug, Clone)]
pub struct StructuredSchema {
    pub name: String,
    pub schema: Value,
}

impl StructuredSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// A backend-independent adapter to a specific LLM service.
///
/// Every operation takes the full message history, optional system
/// instructions, and the tool declarations available this turn; each backend
/// translates these into its own wire format and translates responses back
/// into the common [`Message`] model.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for logging/diagnostics (e.g. `"openai:gpt-4o"`).
    fn name(&self) -> String;

    /// Single non-streaming completion.
    async fn chat(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<Message>;

    /// A lazy sequence of text chunks. Per §4.2's stream-decoding contract,
    /// only text deltas are surfaced; a turn that resolves to a tool call must
    /// be buffered internally and mapped to a non-streamed completion for that
    /// turn (the backend may return a single-item stream containing the whole
    /// text, or an empty stream, when the model instead asked to call a tool —
    /// callers needing tool-call detection should use `chat` for that turn).
    async fn stream(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<TextStream>;

    /// Structured-output completion: the backend enforces (via JSON-mode or a
    /// forced tool call matching `schema.name`/`schema.schema`) that the
    /// response parses as `schema.schema`, returning the parsed value.
    async fn structured(
        &self,
        messages: &[Message],
        instructions: Option<&str>,
        schema: &StructuredSchema,
    ) -> Result<Value>;
}

pub type DynProvider = Arc<dyn Provider>;
