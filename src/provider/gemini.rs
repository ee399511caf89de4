//! Gemini `generateContent` backend: `contents`/`parts`, top-level
//! `systemInstruction`, `functionCall`/`functionResponse` parts, structured
//! output via a forced `functionCall` (same strategy as Anthropic, per
//! §4.2's provider-hierarchy table).

use crate::config::hosted;
use crate::provider::stream::{single_chunk_stream, TextStream};
use crate::provider::{Provider, StructuredSchema};
use crate::tools::Tool;
use crate::types::{ContentBlock, Message, MessageRole, ModelName, TextBlock, Temperature, ToolUseBlock, Usage};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub struct GeminiBackend {
    model: ModelName,
    base_url: String,
    api_key: String,
    temperature: Temperature,
    max_tokens: Option<u32>,
    http_client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            model: ModelName::new(model)?,
            base_url: hosted::GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            temperature: Temperature::default(),
            max_tokens: None,
            http_client,
        })
    }

    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.base_url,
            self.model.as_str(),
            method,
            self.api_key
        )
    }

    fn to_wire_contents(&self, messages: &[Message]) -> Vec<Value> {
        let mut wire = Vec::new();

        for message in messages {
            match message.role {
                MessageRole::System => continue,
                MessageRole::User => {
                    wire.push(serde_json::json!({
                        "role": "user",
                        "parts": [{"text": message.text()}],
                    }));
                }
                MessageRole::Assistant | MessageRole::Model => {
                    let mut parts = Vec::new();
                    let text = message.text();
                    if !text.is_empty() {
                        parts.push(serde_json::json!({"text": text}));
                    }
                    for tool_use in message.tool_uses() {
                        let args = tool_use.arguments().unwrap_or_default();
                        parts.push(serde_json::json!({
                            "functionCall": {"name": tool_use.name, "args": args},
                        }));
                    }
                    wire.push(serde_json::json!({"role": "model", "parts": parts}));
                }
                MessageRole::Tool => {
                    let mut parts = Vec::new();
                    for block in &message.content {
                        if let ContentBlock::ToolResult(result) = block {
                            parts.push(serde_json::json!({
                                "functionResponse": {
                                    "name": result.tool_name,
                                    "response": {"result": result.content},
                                }
                            }));
                        }
                    }
                    wire.push(serde_json::json!({"role": "user", "parts": parts}));
                }
            }
        }

        wire
    }

    fn system_instruction(&self, messages: &[Message], instructions: Option<&str>) -> Option<Value> {
        let mut parts = Vec::new();
        if let Some(i) = instructions {
            if !i.is_empty() {
                parts.push(serde_json::json!({"text": i}));
            }
        }
        for m in messages {
            if m.role == MessageRole::System {
                parts.push(serde_json::json!({"text": m.text()}));
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(serde_json::json!({"parts": parts}))
        }
    }

    fn to_wire_tools(&self, tools: &[Tool]) -> Option<Vec<Value>> {
        if tools.is_empty() {
            return None;
        }
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.json_schema(),
                })
            })
            .collect();
        Some(vec![serde_json::json!({"functionDeclarations": declarations})])
    }

    async fn generate(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool], forced_function: Option<&str>) -> Result<Value> {
        let mut body = serde_json::json!({
            "contents": self.to_wire_contents(messages),
            "generationConfig": {
                "temperature": self.temperature.value(),
            },
        });
        if let Some(max_tokens) = self.max_tokens {
            body["generationConfig"]["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        if let Some(system) = self.system_instruction(messages, instructions) {
            body["systemInstruction"] = system;
        }
        if let Some(wire_tools) = self.to_wire_tools(tools) {
            body["tools"] = Value::Array(wire_tools);
        }
        if let Some(name) = forced_function {
            body["toolConfig"] = serde_json::json!({
                "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]},
            });
        }

        let response = self
            .http_client
            .post(self.endpoint("generateContent"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider_with_status("Gemini backend error", status, text));
        }

        response.json::<Value>().await.map_err(Error::Http)
    }
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Value,
}

fn parse_gemini_response(body: &Value) -> Result<Message> {
    let parts: Vec<GeminiPart> = serde_json::from_value(
        body["candidates"][0]["content"]["parts"]
            .clone()
            .as_array()
            .cloned()
            .map(Value::Array)
            .unwrap_or(Value::Array(vec![])),
    )?;

    let mut blocks = Vec::new();
    for (i, part) in parts.into_iter().enumerate() {
        if let Some(text) = part.text {
            blocks.push(ContentBlock::Text(TextBlock::new(text)));
        } else if let Some(call) = part.function_call {
            blocks.push(ContentBlock::ToolUse(ToolUseBlock::new(
                format!("call_{i}"),
                call.name,
                serde_json::to_string(&call.args)?,
            )));
        }
    }

    let usage = body.get("usageMetadata").map(|u| {
        Usage::new(
            u.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
            u.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
        )
    });

    let mut message = Message::assistant(blocks);
    message.usage = usage;
    Ok(message)
}

#[async_trait::async_trait]
impl Provider for GeminiBackend {
    fn name(&self) -> String {
        format!("gemini:{}", self.model)
    }

    async fn chat(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<Message> {
        let body = self.generate(messages, instructions, tools, None).await?;
        parse_gemini_response(&body)
    }

    async fn stream(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<TextStream> {
        // Gemini's `streamGenerateContent` yields the same parts shape in
        // chunked form; buffered the same way as the other backends rather
        // than threading a second NDJSON-ish decoder through this crate.
        let message = self.chat(messages, instructions, tools).await?;
        Ok(single_chunk_stream(message.text()))
    }

    async fn structured(&self, messages: &[Message], instructions: Option<&str>, schema: &StructuredSchema) -> Result<Value> {
        // `schema.schema` is used directly as the function's `parameters`
        // rather than routed through `Tool::json_schema`, since the target
        // type may not be expressible as a flat `ToolProperty` list.
        let mut body = serde_json::json!({
            "contents": self.to_wire_contents(messages),
            "generationConfig": {"temperature": self.temperature.value()},
            "tools": [{
                "functionDeclarations": [{
                    "name": schema.name,
                    "description": "structured output target",
                    "parameters": schema.schema,
                }],
            }],
            "toolConfig": {
                "functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [schema.name]},
            },
        });
        if let Some(system) = self.system_instruction(messages, instructions) {
            body["systemInstruction"] = system;
        }

        let response = self
            .http_client
            .post(self.endpoint("generateContent"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider_with_status("Gemini backend error", status, text));
        }

        let parsed: Value = response.json().await.map_err(Error::Http)?;
        let message = parse_gemini_response(&parsed)?;

        for tool_use in message.tool_uses() {
            if tool_use.name == schema.name {
                return Ok(serde_json::from_str(&tool_use.arguments_json)?);
            }
        }

        Err(Error::provider(format!(
            "Gemini backend did not call the required function '{}'",
            schema.name
        )))
    }
}
