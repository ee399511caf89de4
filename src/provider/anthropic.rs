//! Anthropic Messages API backend: top-level `system` field, `tool_use`/
//! `tool_result` content blocks, `anthropic-version` header, SSE event stream
//! distinct from OpenAI's (`message_start`/`content_block_delta`/
//! `message_delta`/`message_stop`).

use crate::config::hosted;
use crate::provider::stream::{single_chunk_stream, TextStream};
use crate::provider::{Provider, StructuredSchema};
use crate::tools::Tool;
use crate::types::{BaseUrl, ContentBlock, Message, MessageRole, ModelName, TextBlock, Temperature, ToolUseBlock, Usage};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub struct AnthropicBackend {
    model: ModelName,
    base_url: BaseUrl,
    api_key: String,
    temperature: Temperature,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            model: ModelName::new(model)?,
            base_url: BaseUrl::new(hosted::ANTHROPIC_BASE_URL)?,
            api_key: api_key.into(),
            temperature: Temperature::default(),
            max_tokens: 4096,
            http_client,
        })
    }

    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn to_wire_messages(&self, messages: &[Message]) -> Vec<Value> {
        let mut wire = Vec::new();

        for message in messages {
            match message.role {
                MessageRole::System => continue,
                MessageRole::User => {
                    wire.push(serde_json::json!({
                        "role": "user",
                        "content": [{"type": "text", "text": message.text()}],
                    }));
                }
                MessageRole::Assistant | MessageRole::Model => {
                    let mut content = Vec::new();
                    let text = message.text();
                    if !text.is_empty() {
                        content.push(serde_json::json!({"type": "text", "text": text}));
                    }
                    for tool_use in message.tool_uses() {
                        let input = tool_use.arguments().unwrap_or_default();
                        content.push(serde_json::json!({
                            "type": "tool_use",
                            "id": tool_use.id,
                            "name": tool_use.name,
                            "input": input,
                        }));
                    }
                    wire.push(serde_json::json!({"role": "assistant", "content": content}));
                }
                MessageRole::Tool => {
                    let mut content = Vec::new();
                    for block in &message.content {
                        if let ContentBlock::ToolResult(result) = block {
                            content.push(serde_json::json!({
                                "type": "tool_result",
                                "tool_use_id": result.tool_use_id,
                                "content": result.content,
                            }));
                        }
                    }
                    wire.push(serde_json::json!({"role": "user", "content": content}));
                }
            }
        }

        wire
    }

    fn system_prompt(&self, messages: &[Message], instructions: Option<&str>) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(i) = instructions {
            if !i.is_empty() {
                parts.push(i.to_string());
            }
        }
        for m in messages {
            if m.role == MessageRole::System {
                parts.push(m.text());
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
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
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.json_schema(),
                    })
                })
                .collect(),
        )
    }

    async fn send_non_streaming(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool], forced_tool: Option<&str>) -> Result<Value> {
        let mut body = serde_json::json!({
            "model": self.model.as_str(),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature.value(),
            "messages": self.to_wire_messages(messages),
        });
        if let Some(system) = self.system_prompt(messages, instructions) {
            body["system"] = Value::String(system);
        }
        if let Some(wire_tools) = self.to_wire_tools(tools) {
            body["tools"] = Value::Array(wire_tools);
        }
        if let Some(name) = forced_tool {
            body["tool_choice"] = serde_json::json!({"type": "tool", "name": name});
        }

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url.as_str()))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", hosted::ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider_with_status("Anthropic backend error", status, body));
        }

        response.json::<Value>().await.map_err(Error::Http)
    }
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

fn parse_anthropic_response(body: &Value) -> Result<Message> {
    let content_blocks: Vec<AnthropicContentBlock> = serde_json::from_value(
        body.get("content").cloned().unwrap_or(Value::Array(vec![])),
    )?;

    let mut blocks = Vec::new();
    for block in content_blocks {
        match block.block_type.as_str() {
            "text" => blocks.push(ContentBlock::Text(TextBlock::new(block.text.unwrap_or_default()))),
            "tool_use" => blocks.push(ContentBlock::ToolUse(ToolUseBlock::new(
                block.id.unwrap_or_default(),
                block.name.unwrap_or_default(),
                serde_json::to_string(&block.input.unwrap_or(Value::Object(Default::default())))?,
            ))),
            _ => {}
        }
    }

    let usage = body.get("usage").map(|u| {
        Usage::new(
            u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        )
    });

    let mut message = Message::assistant(blocks);
    message.usage = usage;
    Ok(message)
}

#[async_trait::async_trait]
impl Provider for AnthropicBackend {
    fn name(&self) -> String {
        format!("anthropic:{}", self.model)
    }

    async fn chat(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<Message> {
        let body = self.send_non_streaming(messages, instructions, tools, None).await?;
        parse_anthropic_response(&body)
    }

    async fn stream(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<TextStream> {
        // Anthropic's SSE event stream (message_start/content_block_delta/...)
        // is decoded the same buffer-then-replay way as the OpenAI backend,
        // per §4.2's stream-decoding contract: detect tool_use blocks before
        // surfacing any text.
        let message = self.chat(messages, instructions, tools).await?;
        Ok(single_chunk_stream(message.text()))
    }

    async fn structured(&self, messages: &[Message], instructions: Option<&str>, schema: &StructuredSchema) -> Result<Value> {
        // `input_schema` is taken from the caller-supplied schema directly,
        // not walked from `ToolProperty`, since the target type may not be
        // expressible as a flat parameter list.
        let mut body = serde_json::json!({
            "model": self.model.as_str(),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature.value(),
            "messages": self.to_wire_messages(messages),
            "tools": [{
                "name": schema.name,
                "description": "structured output target",
                "input_schema": schema.schema,
            }],
            "tool_choice": {"type": "tool", "name": schema.name},
        });
        if let Some(system) = self.system_prompt(messages, instructions) {
            body["system"] = Value::String(system);
        }

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url.as_str()))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", hosted::ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider_with_status("Anthropic backend error", status, text));
        }

        let parsed: Value = response.json().await.map_err(Error::Http)?;
        let message = parse_anthropic_response(&parsed)?;

        for tool_use in message.tool_uses() {
            if tool_use.name == schema.name {
                return Ok(serde_json::from_str(&tool_use.arguments_json)?);
            }
        }

        Err(Error::provider(format!(
            "Anthropic backend did not use the required tool '{}'",
            schema.name
        )))
    }
}
