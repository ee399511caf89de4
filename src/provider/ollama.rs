//! Ollama `/api/chat` backend: NDJSON framing (one JSON object per line,
//! `"done": true` terminator carrying `prompt_eval_count`/`eval_count`
//! usage), object-valued tool-call arguments (no stringification quirk,
//! unlike the OpenAI family).

use crate::config::hosted;
use crate::provider::stream::{single_chunk_stream, TextStream};
use crate::provider::{Provider, StructuredSchema};
use crate::tools::Tool;
use crate::types::{ContentBlock, Message, MessageRole, ModelName, TextBlock, ToolUseBlock, Usage};
use crate::{Error, Result};
use futures::stream::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub struct OllamaBackend {
    model: ModelName,
    base_url: String,
    http_client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(model, hosted::OLLAMA_BASE_URL)
    }

    pub fn with_base_url(model: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            model: ModelName::new(model)?,
            base_url: base_url.into(),
            http_client,
        })
    }

    fn to_wire_messages(&self, messages: &[Message], instructions: Option<&str>) -> Vec<Value> {
        let mut wire = Vec::with_capacity(messages.len() + 1);

        if let Some(instructions) = instructions.filter(|s| !s.is_empty()) {
            wire.push(serde_json::json!({"role": "system", "content": instructions}));
        }

        for message in messages {
            match message.role {
                MessageRole::System => {
                    wire.push(serde_json::json!({"role": "system", "content": message.text()}));
                }
                MessageRole::User => {
                    wire.push(serde_json::json!({"role": "user", "content": message.text()}));
                }
                MessageRole::Assistant | MessageRole::Model => {
                    let tool_calls: Vec<Value> = message
                        .tool_uses()
                        .into_iter()
                        .map(|t| {
                            serde_json::json!({
                                "function": {
                                    "name": t.name,
                                    "arguments": t.arguments().unwrap_or_default(),
                                }
                            })
                        })
                        .collect();

                    let mut entry = serde_json::json!({"role": "assistant", "content": message.text()});
                    if !tool_calls.is_empty() {
                        entry["tool_calls"] = Value::Array(tool_calls);
                    }
                    wire.push(entry);
                }
                MessageRole::Tool => {
                    for block in &message.content {
                        if let ContentBlock::ToolResult(result) = block {
                            wire.push(serde_json::json!({"role": "tool", "content": result.content}));
                        }
                    }
                }
            }
        }

        wire
    }

    fn to_wire_tools(&self, tools: &[Tool]) -> Option<Vec<Value>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.json_schema(),
                        }
                    })
                })
                .collect(),
        )
    }

    async fn send(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool], format: Option<&Value>) -> Result<Vec<OllamaChunk>> {
        let mut body = serde_json::json!({
            "model": self.model.as_str(),
            "messages": self.to_wire_messages(messages, instructions),
            "stream": true,
        });
        if let Some(wire_tools) = self.to_wire_tools(tools) {
            body["tools"] = Value::Array(wire_tools);
        }
        if let Some(format) = format {
            body["format"] = format.clone();
        }

        let response = self
            .http_client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider_with_status("Ollama backend error", status, text));
        }

        let mut chunks = Vec::new();
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(Error::Http)?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                if line.is_empty() {
                    continue;
                }
                chunks.push(serde_json::from_str::<OllamaChunk>(&line)?);
            }
        }

        let remainder = buffer.trim();
        if !remainder.is_empty() {
            chunks.push(serde_json::from_str::<OllamaChunk>(remainder)?);
        }

        Ok(chunks)
    }
}

#[derive(Deserialize)]
struct OllamaChunk {
    message: Option<OllamaMessage>,
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Deserialize)]
struct OllamaFunctionCall {
    name: String,
    arguments: Value,
}

fn assemble_message(chunks: Vec<OllamaChunk>) -> Result<Message> {
    let mut text = String::new();
    let mut blocks = Vec::new();
    let mut usage = None;

    for (i, chunk) in chunks.into_iter().enumerate() {
        if let Some(message) = chunk.message {
            if let Some(content) = message.content {
                text.push_str(&content);
            }
            for (j, call) in message.tool_calls.into_iter().flatten().enumerate() {
                blocks.push(ContentBlock::ToolUse(ToolUseBlock::new(
                    format!("call_{i}_{j}"),
                    call.function.name,
                    serde_json::to_string(&call.function.arguments)?,
                )));
            }
        }
        if chunk.done {
            usage = Some(Usage::new(chunk.prompt_eval_count.unwrap_or(0), chunk.eval_count.unwrap_or(0)));
        }
    }

    if !text.is_empty() || blocks.is_empty() {
        blocks.insert(0, ContentBlock::Text(TextBlock::new(text)));
    }

    let mut message = Message::assistant(blocks);
    message.usage = usage;
    Ok(message)
}

#[async_trait::async_trait]
impl Provider for OllamaBackend {
    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn chat(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<Message> {
        let chunks = self.send(messages, instructions, tools, None).await?;
        assemble_message(chunks)
    }

    async fn stream(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<TextStream> {
        // NDJSON framing is drained in full before replaying, matching every
        // other backend's buffer-then-replay streaming contract (§4.2).
        let message = self.chat(messages, instructions, tools).await?;
        Ok(single_chunk_stream(message.text()))
    }

    async fn structured(&self, messages: &[Message], instructions: Option<&str>, schema: &StructuredSchema) -> Result<Value> {
        let chunks = self
            .send(messages, instructions, &[], Some(&schema.schema))
            .await?;
        let message = assemble_message(chunks)?;
        serde_json::from_str(message.text().trim()).map_err(|e| {
            Error::provider(format!("structured output did not parse as {}: {e}", schema.name))
        })
    }
}
