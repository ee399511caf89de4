//! The agent execution core: a provider-generic conversation loop (§4.1).
//!
//! `Agent` wraps a [`DynProvider`], a [`ChatHistory`], an optional [`Hooks`]
//! registry, and an [`Observers`] bus. `chat`/`stream`/`structured` are the
//! only entry points; everything else (tool dispatch, instruction assembly,
//! iteration capping) happens inside the loop.

use crate::history::{ChatHistory, InMemoryChatHistory};
use crate::hooks::{Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent};
use crate::observer::{topics, Event, Observers};
use crate::provider::{DynProvider, StructuredSchema, TextStream};
use crate::tools::Tool;
use crate::types::Message;
use crate::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

const DEFAULT_MAX_ITERATIONS: usize = 10;
const DEFAULT_CONTEXT_WINDOW: usize = 100;

/// Strips the first balanced `openTag ... closeTag` block from `text`, if
/// present. Used by RAG to replace a stale `<EXTRA-CONTEXT>` block rather
/// than accumulating one per turn (§4.1 "Instruction mutation").
pub fn remove_delimited_content(text: &str, open_tag: &str, close_tag: &str) -> String {
    match (text.find(open_tag), text.find(close_tag)) {
        (Some(start), Some(end)) if end >= start => {
            let before = &text[..start];
            let after = &text[end + close_tag.len()..];
            format!("{before}{after}")
        }
        _ => text.to_string(),
    }
}

/// A conversational agent bound to a single provider backend.
pub struct Agent {
    provider: DynProvider,
    instructions: Option<String>,
    history: Arc<dyn ChatHistory>,
    tools: Vec<Tool>,
    hooks: Hooks,
    observers: Observers,
    max_iterations: usize,
}

impl Agent {
    pub fn new(provider: DynProvider) -> Self {
        Self {
            provider,
            instructions: None,
            history: Arc::new(InMemoryChatHistory::new(DEFAULT_CONTEXT_WINDOW)),
            tools: Vec::new(),
            hooks: Hooks::new(),
            observers: Observers::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_chat_history(mut self, history: Arc<dyn ChatHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn add_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn add_tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn history(&self) -> Arc<dyn ChatHistory> {
        self.history.clone()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Replaces the agent's instructions, used by RAG to inject/refresh an
    /// `<EXTRA-CONTEXT>` block ahead of delegating to this core (§4.4).
    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.instructions = Some(instructions.into());
    }

    fn resolve_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Runs a tool call through the PreToolUse/PostToolUse hook layer, then
    /// `execute`, and wraps the outcome as a tool-result message. Unknown
    /// tool names and callable failures both produce an error-carrying
    /// tool-result rather than aborting the loop (§4.1 step 5b).
    async fn dispatch_tool_call(&self, call_id: &str, name: &str, arguments_json: &str, history_snapshot: &[Message]) -> Message {
        let history_values: Vec<Value> = history_snapshot
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();

        let arguments: Value = serde_json::from_str(arguments_json).unwrap_or(Value::Object(Default::default()));

        let pre_event = PreToolUseEvent::new(name.to_string(), arguments.clone(), call_id.to_string(), history_values.clone());
        let pre_decision = self.hooks.execute_pre_tool_use(pre_event).await;

        if let Some(decision) = &pre_decision {
            if !decision.continue_execution {
                let reason = decision.reason.clone().unwrap_or_else(|| "blocked by hook".to_string());
                return Message::tool_result(call_id, name, format!("Error: {reason}"));
            }
        }

        let effective_arguments = pre_decision
            .as_ref()
            .and_then(|d| d.modified_input.clone())
            .unwrap_or(arguments);

        self.observers
            .publish(Event::new(topics::TOOL_CALLING, serde_json::json!({"tool_name": name, "call_id": call_id})))
            .await;

        let inputs = match effective_arguments {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        let result_text = match self.resolve_tool(name) {
            None => format!("Error: unknown tool '{name}'"),
            Some(tool) => match tool.execute(inputs, call_id).await {
                Ok(text) => text,
                Err(e) => format!("Error: {e}"),
            },
        };

        let post_event = PostToolUseEvent::new(
            name.to_string(),
            Value::Null,
            call_id.to_string(),
            Value::String(result_text.clone()),
            history_values,
        );
        // PostToolUse cannot change the outcome (the tool already ran); it is
        // notification-only here, matching the teacher's hooks.rs doc for
        // this event (audit logging/compliance, not rewriting).
        let _ = self.hooks.execute_post_tool_use(post_event).await;

        self.observers
            .publish(Event::new(topics::TOOL_CALLED, serde_json::json!({"tool_name": name, "call_id": call_id})))
            .await;

        Message::tool_result(call_id, name, result_text)
    }

    /// Runs the full conversation loop for one user turn and returns the
    /// final assistant message (§4.1 steps 1-7).
    pub async fn chat(&self, message: impl Into<String>) -> Result<Message> {
        let prompt = message.into();
        let history_for_hook: Vec<Value> = self
            .history
            .snapshot()
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();

        let prompt_event = UserPromptSubmitEvent::new(prompt.clone(), history_for_hook);
        let prompt_decision = self.hooks.execute_user_prompt_submit(prompt_event).await;

        if let Some(decision) = &prompt_decision {
            if !decision.continue_execution {
                let reason = decision.reason.clone().unwrap_or_else(|| "blocked by hook".to_string());
                return Err(Error::agent(format!("user prompt blocked: {reason}")));
            }
        }

        let effective_prompt = prompt_decision
            .and_then(|d| d.modified_prompt)
            .unwrap_or(prompt);

        self.history.add(Message::user(effective_prompt))?;

        self.observers.publish(Event::new(topics::CHAT_START, Value::Null)).await;

        let mut iterations = 0usize;
        let mut last_assistant_message: Option<Message> = None;
        let final_message = loop {
            if iterations >= self.max_iterations {
                self.observers
                    .publish(Event::new(
                        topics::ERROR,
                        serde_json::json!({"reason": "max tool iterations exceeded"}),
                    ))
                    .await;
                break last_assistant_message
                    .ok_or_else(|| Error::agent("max tool iterations exceeded before any assistant response"))?;
            }
            iterations += 1;

            self.observers.publish(Event::new(topics::INFERENCE_START, Value::Null)).await;
            let snapshot = self.history.snapshot();
            let response = self.provider.chat(&snapshot, self.instructions.as_deref(), &self.tools).await?;
            self.observers.publish(Event::new(topics::INFERENCE_STOP, Value::Null)).await;

            self.history.add(response.clone())?;
            last_assistant_message = Some(response.clone());

            if !response.has_tool_uses() {
                break response;
            }

            let snapshot_for_hooks = self.history.snapshot();
            for tool_use in response.tool_uses() {
                let result_message = self
                    .dispatch_tool_call(&tool_use.id, &tool_use.name, &tool_use.arguments_json, &snapshot_for_hooks)
                    .await;
                self.history.add(result_message)?;
            }
        };

        self.observers.publish(Event::new(topics::CHAT_STOP, Value::Null)).await;
        Ok(final_message)
    }

    /// A lazy sequence of text chunks for one user turn. Per §4.1/§4.2, a
    /// turn resolving to a tool call is not observable as incremental text
    /// here — dispatch happens internally and the caller sees only the
    /// final turn's text (possibly empty, if the model only used tools).
    pub async fn stream(&self, message: impl Into<String>) -> Result<TextStream> {
        let prompt = message.into();
        self.history.add(Message::user(prompt))?;

        let mut iterations = 0usize;
        loop {
            if iterations >= self.max_iterations {
                return Err(Error::agent("max tool iterations exceeded during streaming"));
            }
            iterations += 1;

            // Every backend's `stream()` already buffers a full `chat()` turn
            // internally to decide whether it resolved to a tool call (§4.2);
            // calling `chat` directly here avoids doing that buffering twice.
            let snapshot = self.history.snapshot();
            let response = self.provider.chat(&snapshot, self.instructions.as_deref(), &self.tools).await?;

            if !response.has_tool_uses() {
                self.history.add(response.clone())?;
                return Ok(crate::provider::stream::single_chunk_stream(response.text()));
            }

            self.history.add(response.clone())?;
            let snapshot_for_hooks = self.history.snapshot();
            for tool_use in response.tool_uses() {
                let result_message = self
                    .dispatch_tool_call(&tool_use.id, &tool_use.name, &tool_use.arguments_json, &snapshot_for_hooks)
                    .await;
                self.history.add(result_message)?;
            }
        }
    }

    /// Delegates to `provider.structured`, retrying parse failures up to
    /// `max_retries` times with a tightened instruction (§4.1 "Structured
    /// output").
    pub async fn structured(&self, message: impl Into<String>, schema: StructuredSchema, max_retries: usize) -> Result<Value> {
        let prompt = message.into();
        self.history.add(Message::user(prompt))?;

        self.observers
            .publish(Event::new(topics::STRUCTURED_EXTRACTING, Value::Null))
            .await;

        let snapshot = self.history.snapshot();
        let mut last_err = None;

        for attempt in 0..=max_retries {
            let instructions = if attempt == 0 {
                self.instructions.clone()
            } else {
                Some(format!(
                    "{}\n\nYour previous response did not match the required schema exactly. Try again.",
                    self.instructions.clone().unwrap_or_default()
                ))
            };

            match self.provider.structured(&snapshot, instructions.as_deref(), &schema).await {
                Ok(value) => {
                    self.observers
                        .publish(Event::new(topics::STRUCTURED_EXTRACTED, Value::Null))
                        .await;
                    return Ok(value);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::agent("structured output failed with no retries attempted")))
    }

    /// Wraps a tool result as a message, for callers that drive tool
    /// dispatch manually outside `chat`'s loop (mirrors the teacher's
    /// `add_tool_result` helper).
    pub fn tool_result_message(tool_use_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Message {
        Message::tool_result(tool_use_id, tool_name, content)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("instructions", &self.instructions)
            .field("tools", &self.tools.len())
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}
