//! OpenAI-compatible backend: chat-completions request/response shape, SSE
//! streaming, and `tool_calls[]`-based tool dispatch.
//!
//! This also backs Deepseek, Mistral, and any local OpenAI-compatible server
//! (LM Studio, Ollama's `/v1` shim, llama.cpp, vLLM) by composition — same
//! request/response shapes, different base URL and model name (§4.2
//! "Provider hierarchy reuse").

use crate::config::{hosted, OpenAiServerProfile};
use crate::provider::stream::{single_chunk_stream, TextStream};
use crate::provider::{Provider, StructuredSchema};
use crate::tools::Tool;
use crate::types::{BaseUrl, ContentBlock, Message, MessageRole, ModelName, TextBlock, Temperature, ToolResultBlock, ToolUseBlock, Usage};
use crate::utils::{
    parse_sse_stream, OpenAIFunction, OpenAIMessage, OpenAIRequest, OpenAIToolCall, ToolCallAggregator,
};
use crate::{Error, Result};
use futures::stream::StreamExt;
use serde_json::Value;
use std::time::Duration;

/// An OpenAI-compatible chat backend.
pub struct OpenAiBackend {
    model: ModelName,
    base_url: BaseUrl,
    api_key: String,
    temperature: Temperature,
    max_tokens: Option<u32>,
    http_client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(model: ModelName, base_url: BaseUrl, api_key: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            model,
            base_url,
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

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(self)
    }

    /// The hosted OpenAI API.
    pub fn openai(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::new(ModelName::new(model)?, BaseUrl::new(hosted::OPENAI_BASE_URL)?, api_key)
    }

    /// Deepseek, via its OpenAI-compatible endpoint.
    pub fn deepseek(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::new(ModelName::new(model)?, BaseUrl::new(hosted::DEEPSEEK_BASE_URL)?, api_key)
    }

    /// Mistral, via its OpenAI-compatible endpoint.
    pub fn mistral(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::new(ModelName::new(model)?, BaseUrl::new(hosted::MISTRAL_BASE_URL)?, api_key)
    }

    /// A local OpenAI-compatible server (LM Studio, Ollama, llama.cpp, vLLM).
    pub fn local(profile: OpenAiServerProfile, model: impl Into<String>) -> Result<Self> {
        Self::new(ModelName::new(model)?, BaseUrl::new(profile.default_url())?, "not-needed")
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str())
    }

    fn to_wire_messages(&self, messages: &[Message], instructions: Option<&str>) -> Vec<OpenAIMessage> {
        let mut wire = Vec::with_capacity(messages.len() + 1);

        if let Some(instructions) = instructions.filter(|s| !s.is_empty()) {
            wire.push(OpenAIMessage {
                role: "system".to_string(),
                content: instructions.to_string(),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for message in messages {
            match message.role {
                MessageRole::System => {
                    wire.push(OpenAIMessage {
                        role: "system".to_string(),
                        content: message.text(),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
                MessageRole::User => {
                    wire.push(OpenAIMessage {
                        role: "user".to_string(),
                        content: message.text(),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                }
                MessageRole::Assistant | MessageRole::Model => {
                    let tool_calls: Vec<OpenAIToolCall> = message
                        .tool_uses()
                        .into_iter()
                        .map(|t| OpenAIToolCall {
                            id: t.id.clone(),
                            call_type: "function".to_string(),
                            function: OpenAIFunction {
                                name: t.name.clone(),
                                arguments: t.arguments_json.clone(),
                            },
                        })
                        .collect();

                    wire.push(OpenAIMessage {
                        role: "assistant".to_string(),
                        content: message.text(),
                        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                        tool_call_id: None,
                    });
                }
                MessageRole::Tool => {
                    for block in &message.content {
                        if let ContentBlock::ToolResult(result) = block {
                            wire.push(OpenAIMessage {
                                role: "tool".to_string(),
                                content: result.content.clone(),
                                tool_calls: None,
                                tool_call_id: Some(result.tool_use_id.clone()),
                            });
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

    fn build_request(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool], stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.as_str().to_string(),
            messages: self.to_wire_messages(messages, instructions),
            stream,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature.value()),
            tools: self.to_wire_tools(tools),
        }
    }

    async fn send(&self, request: &OpenAIRequest) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider_with_status(
                format!("OpenAI-compatible backend returned {status}"),
                status,
                body,
            ));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiBackend {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn chat(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<Message> {
        let request = self.build_request(messages, instructions, tools, true);
        let response = self.send(&request).await?;

        let mut sse = parse_sse_stream(response);
        let mut aggregator = ToolCallAggregator::new();
        let mut blocks = Vec::new();

        while let Some(chunk) = sse.next().await {
            let chunk = chunk?;
            blocks.extend(aggregator.process_chunk(chunk)?);
        }

        if blocks.is_empty() {
            blocks.push(ContentBlock::Text(TextBlock::new(String::new())));
        }

        let mut message = Message::assistant(blocks);
        message.usage = Some(Usage::default());
        Ok(message)
    }

    async fn stream(&self, messages: &[Message], instructions: Option<&str>, tools: &[Tool]) -> Result<TextStream> {
        // Per §4.2's stream-decoding contract, tool-call detection is out of
        // scope for the streamed return type: buffer the whole turn, and
        // replay its text (if any) as a single chunk. A turn that resolved to
        // a tool call yields no text here; the caller must use `chat` to get
        // at the tool-call content blocks.
        let message = self.chat(messages, instructions, tools).await?;
        Ok(single_chunk_stream(message.text()))
    }

    async fn structured(&self, messages: &[Message], instructions: Option<&str>, schema: &StructuredSchema) -> Result<Value> {
        let augmented = format!(
            "{}\n\nRespond ONLY with JSON matching this schema, no prose:\n{}",
            instructions.unwrap_or_default(),
            schema.schema
        );
        let request = self.build_request(messages, Some(&augmented), &[], true);
        let response = self.send(&request).await?;

        let mut sse = parse_sse_stream(response);
        let mut aggregator = ToolCallAggregator::new();
        let mut text = String::new();

        while let Some(chunk) = sse.next().await {
            let chunk = chunk?;
            for block in aggregator.process_chunk(chunk)? {
                if let ContentBlock::Text(t) = block {
                    text.push_str(&t.text);
                }
            }
        }

        serde_json::from_str(text.trim()).map_err(|e| {
            Error::provider(format!("structured output did not parse as {}: {e}", schema.name))
        })
    }
}

/// Converts a tool-call result into a message suitable for re-insertion into
/// history ahead of the next `chat` call, mirroring the teacher's
/// `add_tool_result` convenience helper.
pub fn tool_result_message(tool_use: &ToolUseBlock, content: impl Into<String>) -> Message {
    Message::tool_result(tool_use.id.clone(), tool_use.name.clone(), content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire_messages_maps_roles_and_tool_calls() {
        let backend = OpenAiBackend::new(
            ModelName::new("test-model").unwrap(),
            BaseUrl::new("http://localhost:1234/v1").unwrap(),
            "key",
        )
        .unwrap();

        let messages = vec![
            Message::system("be terse"),
            Message::user("what's 2+2?"),
            Message::assistant(vec![ContentBlock::ToolUse(ToolUseBlock::new("c1", "add", r#"{"a":2,"b":2}"#))]),
            Message::tool_result("c1", "add", "4"),
        ];

        let wire = backend.to_wire_messages(&messages, Some("inject this"));
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content, "inject this");
        assert_eq!(wire[1].role, "system");
        assert_eq!(wire[2].role, "user");
        assert_eq!(wire[3].role, "assistant");
        assert_eq!(wire[3].tool_calls.as_ref().unwrap()[0].function.name, "add");
        assert_eq!(wire[4].role, "tool");
        assert_eq!(wire[4].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_wire_tools_empty_when_no_tools() {
        let backend = OpenAiBackend::new(
            ModelName::new("test-model").unwrap(),
            BaseUrl::new("http://localhost:1234/v1").unwrap(),
            "key",
        )
        .unwrap();
        assert!(backend.to_wire_tools(&[]).is_none());
    }
}
