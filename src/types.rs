//! Core data model for the agent framework.
//!
//! Three families of types live here:
//! - Validated newtypes shared by every provider backend's configuration
//!   (`ModelName`, `BaseUrl`, `Temperature`).
//! - The provider-independent message model (`Message`, `ContentBlock`,
//!   `Attachment`, `Usage`).
//! - The tool-schema and document types shared by the tool registry and the
//!   RAG pipeline (`ToolProperty`, `Document`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// VALIDATED NEWTYPES
// ============================================================================

/// A validated, non-empty model identifier (e.g. "gpt-4o", "claude-3-5-sonnet-20241022").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::config("model name must not be empty"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated base URL (must be non-empty and start with `http://` or `https://`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseUrl(String);

impl BaseUrl {
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(crate::Error::config("base URL must not be empty"));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(crate::Error::config(
                "base URL must start with http:// or https://",
            ));
        }
        Ok(Self(url.trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sampling temperature clamped to the common `[0.0, 2.0]` range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature(f32);

impl Temperature {
    pub fn new(value: f32) -> crate::Result<Self> {
        if !(0.0..=2.0).contains(&value) {
            return Err(crate::Error::config(format!(
                "temperature {value} out of range [0.0, 2.0]"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for Temperature {
    fn default() -> Self {
        Self(0.7)
    }
}

// ============================================================================
// MESSAGE MODEL
// ============================================================================

/// The role a message is attributed to.
///
/// `Model` exists alongside `Assistant` because Gemini's wire format names the
/// assistant role "model"; the agent core always uses `Assistant` internally and
/// backends translate at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Model,
    System,
    Tool,
}

/// Plain text content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
}

impl TextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A single tool invocation requested by the model.
///
/// Arguments are carried as a JSON-encoded string (`arguments_json`) to preserve
/// source-provider fidelity, per the data model's `ToolCallRequest` definition;
/// backends that receive arguments as a structured object (Anthropic, Gemini,
/// Ollama) serialize them to a string at the translation boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub arguments_json: String,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments_json: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments_json: arguments_json.into(),
        }
    }

    /// Parses `arguments_json` into a JSON object map.
    pub fn arguments(&self) -> crate::Result<serde_json::Map<String, Value>> {
        match serde_json::from_str::<Value>(&self.arguments_json)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(serde_json::Map::new()),
            other => Err(crate::Error::invalid_input(format!(
                "tool arguments must be a JSON object, got {other}"
            ))),
        }
    }
}

/// The result of executing a tool call, carried back to the model as a TOOL message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub tool_name: String,
    pub content: String,
}

impl ToolResultBlock {
    pub fn new(
        tool_use_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
        }
    }
}

/// Content is a sum type: text | tool-call request | tool-call result | null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
    Null,
}

/// The kind of attachment: image or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
}

/// How the attachment content is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentContentType {
    Base64,
    Url,
}

/// A non-text payload attached to a message (image or document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub content_type: AttachmentContentType,
    pub media_type: String,
    pub content: String,
}

impl Attachment {
    pub fn image_url(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(crate::Error::invalid_input("image URL must not be empty"));
        }
        let is_data_uri = url.starts_with("data:");
        let is_http = url.starts_with("http://") || url.starts_with("https://");
        if !is_data_uri && !is_http {
            return Err(crate::Error::invalid_input(
                "image URL must be http(s) or a data URI",
            ));
        }
        Ok(Self {
            kind: AttachmentKind::Image,
            content_type: AttachmentContentType::Url,
            media_type: "image/*".to_string(),
            content: url,
        })
    }

    pub fn image_base64(data: impl AsRef<str>, mime_type: impl AsRef<str>) -> crate::Result<Self> {
        let data = data.as_ref();
        let mime_type = mime_type.as_ref();
        if data.trim().is_empty() {
            return Err(crate::Error::invalid_input("base64 image data must not be empty"));
        }
        if mime_type.trim().is_empty() {
            return Err(crate::Error::invalid_input("MIME type must not be empty"));
        }
        Ok(Self {
            kind: AttachmentKind::Image,
            content_type: AttachmentContentType::Base64,
            media_type: mime_type.to_string(),
            content: data.to_string(),
        })
    }
}

/// Token usage reported by a provider for a single completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Usage as directly reported by a provider that gives `total_tokens` independently
    /// of prompt/completion (e.g. a backend that only surfaces a combined count).
    pub fn with_total(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// True when `total_tokens >= prompt_tokens + completion_tokens`, allowing for
    /// providers that round or omit one of the two components.
    pub fn is_consistent(&self) -> bool {
        self.total_tokens + 1 >= self.prompt_tokens + self.completion_tokens
    }
}

/// A single message in a conversation.
///
/// Invariant: `role` is always set (no `Option`); `usage` is only ever attached to
/// assistant messages returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            usage: None,
            attachments: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::Text(TextBlock::new(text))])
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(
            MessageRole::Assistant,
            vec![ContentBlock::Text(TextBlock::new(text))],
        )
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, vec![ContentBlock::Text(TextBlock::new(text))])
    }

    /// A TOOL-role message carrying the result of a single tool invocation.
    pub fn tool_result(tool_use_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            MessageRole::Tool,
            vec![ContentBlock::ToolResult(ToolResultBlock::new(
                tool_use_id,
                tool_name,
                content,
            ))],
        )
    }

    pub fn user_with_blocks(content: Vec<ContentBlock>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> crate::Result<Self> {
        let mut msg = Self::user(text);
        msg.attachments.push(Attachment::image_url(image_url)?);
        Ok(msg)
    }

    pub fn user_with_base64_image(
        text: impl Into<String>,
        base64_data: impl AsRef<str>,
        mime_type: impl AsRef<str>,
    ) -> crate::Result<Self> {
        let mut msg = Self::user(text);
        msg.attachments.push(Attachment::image_base64(base64_data, mime_type)?);
        Ok(msg)
    }

    /// Concatenates all `Text` blocks in this message's content, ignoring other block kinds.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All tool-use blocks in this message, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_uses(&self) -> bool {
        self.content.iter().any(|b| matches!(b, ContentBlock::ToolUse(_)))
    }
}

// ============================================================================
// TOOL SCHEMA
// ============================================================================

/// The JSON-schema-mappable type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

/// A recursive description of one tool parameter (or a nested field of an
/// OBJECT/ARRAY parameter).
///
/// `required` on a child is what contributes that child's name to the parent
/// OBJECT's derived `required` array at schema-generation time — see
/// [`ToolProperty::to_json_schema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProperty {
    pub name: String,
    pub property_type: PropertyType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Present when `property_type == Array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_schema: Option<Box<ToolProperty>>,
    /// Present when `property_type == Object`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<ToolProperty>>,
}

impl ToolProperty {
    pub fn new(name: impl Into<String>, property_type: PropertyType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_type,
            description: description.into(),
            required: false,
            enum_values: None,
            items_schema: None,
            properties: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, PropertyType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, PropertyType::Boolean, description)
    }

    pub fn array(name: impl Into<String>, description: impl Into<String>, items: ToolProperty) -> Self {
        let mut p = Self::new(name, PropertyType::Array, description);
        p.items_schema = Some(Box::new(items));
        p
    }

    pub fn object(name: impl Into<String>, description: impl Into<String>, properties: Vec<ToolProperty>) -> Self {
        let mut p = Self::new(name, PropertyType::Object, description);
        p.properties = Some(properties);
        p
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }

    /// Depth-first walk producing this property's JSON-schema subschema.
    ///
    /// Primitive leaves emit `{type, description?, enum?}`. Arrays emit
    /// `{type:"array", items: subschema}`. Objects recurse and derive their
    /// `required` array from children marked `required = true`.
    pub fn to_json_schema(&self) -> Value {
        match self.property_type {
            PropertyType::Object => {
                let properties = self.properties.as_deref().unwrap_or(&[]);
                let mut props_map = serde_json::Map::new();
                let mut required = Vec::new();
                for child in properties {
                    props_map.insert(child.name.clone(), child.to_json_schema());
                    if child.required {
                        required.push(Value::String(child.name.clone()));
                    }
                }
                let mut schema = serde_json::json!({
                    "type": "object",
                    "properties": props_map,
                    "required": required,
                });
                if !self.description.is_empty() {
                    schema["description"] = Value::String(self.description.clone());
                }
                schema
            }
            PropertyType::Array => {
                let items = self
                    .items_schema
                    .as_ref()
                    .map(|i| i.to_json_schema())
                    .unwrap_or_else(|| serde_json::json!({"type": "string"}));
                let mut schema = serde_json::json!({
                    "type": "array",
                    "items": items,
                });
                if !self.description.is_empty() {
                    schema["description"] = Value::String(self.description.clone());
                }
                schema
            }
            leaf => {
                let type_str = match leaf {
                    PropertyType::String => "string",
                    PropertyType::Integer => "integer",
                    PropertyType::Number => "number",
                    PropertyType::Boolean => "boolean",
                    PropertyType::Array | PropertyType::Object => unreachable!(),
                };
                let mut schema = serde_json::json!({"type": type_str});
                if !self.description.is_empty() {
                    schema["description"] = Value::String(self.description.clone());
                }
                if let Some(values) = &self.enum_values {
                    schema["enum"] = Value::Array(values.iter().cloned().map(Value::String).collect());
                }
                schema
            }
        }
    }
}

// ============================================================================
// DOCUMENT (RAG)
// ============================================================================

/// A unit of retrievable content for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub source_type: String,
    pub source_name: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            source_type: source_type.into(),
            source_name: None,
            metadata: HashMap::new(),
            embedding: None,
            score: None,
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_rejects_empty() {
        assert!(ModelName::new("").is_err());
        assert!(ModelName::new("gpt-4o").is_ok());
    }

    #[test]
    fn test_base_url_requires_scheme() {
        assert!(BaseUrl::new("localhost:1234").is_err());
        assert_eq!(
            BaseUrl::new("http://localhost:1234/v1/").unwrap().as_str(),
            "http://localhost:1234/v1"
        );
    }

    #[test]
    fn test_temperature_range() {
        assert!(Temperature::new(-0.1).is_err());
        assert!(Temperature::new(2.1).is_err());
        assert!(Temperature::new(1.0).is_ok());
    }

    #[test]
    fn test_message_text_concatenates_text_blocks_only() {
        let msg = Message::new(
            MessageRole::Assistant,
            vec![
                ContentBlock::Text(TextBlock::new("hello ")),
                ContentBlock::ToolUse(ToolUseBlock::new("c1", "add", "{}")),
                ContentBlock::Text(TextBlock::new("world")),
            ],
        );
        assert_eq!(msg.text(), "hello world");
        assert!(msg.has_tool_uses());
    }

    #[test]
    fn test_tool_use_arguments_parses_object() {
        let block = ToolUseBlock::new("c1", "add", r#"{"a":2,"b":3}"#);
        let args = block.arguments().unwrap();
        assert_eq!(args.get("a").unwrap(), 2);
    }

    #[test]
    fn test_usage_consistency() {
        let u = Usage::new(10, 5);
        assert_eq!(u.total_tokens, 15);
        assert!(u.is_consistent());

        let inconsistent = Usage::with_total(10, 5, 3);
        assert!(!inconsistent.is_consistent());
    }

    #[test]
    fn test_tool_property_object_schema_derives_required() {
        let schema = ToolProperty::object(
            "params",
            "parameters",
            vec![
                ToolProperty::string("location", "city name").required(),
                ToolProperty::string("units", "unit system"),
            ],
        )
        .to_json_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], serde_json::json!(["location"]));
        assert_eq!(schema["properties"]["location"]["type"], "string");
    }

    #[test]
    fn test_tool_property_array_schema() {
        let schema = ToolProperty::array("tags", "a list of tags", ToolProperty::string("tag", "one tag"))
            .to_json_schema();
        assert_eq!(schema["type"], "array");
        assert_eq!(schema["items"]["type"], "string");
    }

    #[test]
    fn test_attachment_image_url_validation() {
        assert!(Attachment::image_url("").is_err());
        assert!(Attachment::image_url("ftp://example.com/x.png").is_err());
        assert!(Attachment::image_url("https://example.com/x.png").is_ok());
    }
}
