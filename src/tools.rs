//! Tool registry: declarative tools with typed parameter schemas, required-parameter
//! validation, and callable bodies.
//!
//! A [`Tool`]'s callable receives a JSON object of validated inputs and returns a
//! string result (often JSON-encoded) that is handed back to the model as a
//! `ToolResult` content block. Schema generation walks the [`ToolProperty`] tree
//! depth-first, producing the JSON-schema `{type, properties, required}` shape
//! models expect for function/tool declarations.

use crate::types::ToolProperty;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// The async callable body of a tool: takes validated JSON inputs, returns a
/// string result or an error describing why execution failed.
pub type ToolHandler = Arc<
    dyn Fn(Map<String, Value>) -> Pin<Box<dyn Future<Output = Result<String>> + Send>>
        + Send
        + Sync,
>;

/// Transient, per-execution state captured on a `Tool` between `execute` calls.
#[derive(Debug, Clone, Default)]
struct ExecutionState {
    inputs: Option<Map<String, Value>>,
    call_id: Option<String>,
    result: Option<String>,
}

/// A declarative tool the LLM may request the agent to invoke.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolProperty>,
    callable: Option<ToolHandler>,
    state: Arc<Mutex<ExecutionState>>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .field("has_callable", &self.callable.is_some())
            .finish()
    }
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Vec<ToolProperty>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            callable: None,
            state: Arc::new(Mutex::new(ExecutionState::default())),
        }
    }

    pub fn set_callable(&mut self, callable: ToolHandler) {
        self.callable = Some(callable);
    }

    /// Depth-first JSON-schema generation over this tool's top-level parameters,
    /// producing `{type:"object", properties:{...}, required:[...]}`.
    pub fn json_schema(&self) -> Value {
        let root = ToolProperty::object(self.name.clone(), self.description.clone(), self.parameters.clone());
        let mut schema = root.to_json_schema();
        if let Value::Object(ref mut map) = schema {
            map.remove("description");
        }
        schema
    }

    /// Validates that every parameter marked `required` appears in `inputs`, then
    /// invokes the callable. On missing-parameter, fails with
    /// [`Error::missing_parameter`] (propagates). On callable failure, wraps as
    /// [`Error::callable_error`] (captured as tool-result text by the agent core,
    /// non-fatal to the conversation loop).
    pub async fn execute(&self, inputs: Map<String, Value>, call_id: impl Into<String>) -> Result<String> {
        let call_id = call_id.into();

        for param in &self.parameters {
            if param.required && !inputs.contains_key(&param.name) {
                return Err(Error::missing_parameter(self.name.clone(), param.name.clone()));
            }
        }

        let callable = self
            .callable
            .clone()
            .ok_or_else(|| Error::callable_error(self.name.clone(), "no callable registered"))?;

        {
            let mut state = self.state.lock().unwrap();
            state.inputs = Some(inputs.clone());
            state.call_id = Some(call_id.clone());
        }

        let result = callable(inputs)
            .await
            .map_err(|e| Error::callable_error(self.name.clone(), e.to_string()))?;

        self.state.lock().unwrap().result = Some(result.clone());
        Ok(result)
    }

    /// The result captured by the most recent `execute` call, if any.
    pub fn get_result(&self) -> Option<String> {
        self.state.lock().unwrap().result.clone()
    }

    pub fn last_call_id(&self) -> Option<String> {
        self.state.lock().unwrap().call_id.clone()
    }
}

/// Fluent builder for [`Tool`].
pub struct ToolBuilder {
    name: String,
    description: String,
    parameters: Vec<ToolProperty>,
    callable: Option<ToolHandler>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            callable: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameter(mut self, parameter: ToolProperty) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(mut self, parameters: Vec<ToolProperty>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn callable<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.callable = Some(Arc::new(move |inputs| Box::pin(f(inputs))));
        self
    }

    pub fn build(self) -> Tool {
        let mut tool = Tool::new(self.name, self.description, self.parameters);
        if let Some(callable) = self.callable {
            tool.set_callable(callable);
        }
        tool
    }
}

/// Convenience constructor mirroring `ToolBuilder::new(name).build()`-style usage.
pub fn tool(name: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name)
}

/// A named grouping of tools with shared prompt guidance.
///
/// `guidelines` is surfaced to the agent's instructions alongside the tool
/// declarations; `excluded` lists tool names from `provide_tools()` that should
/// not be registered (e.g. a toolkit author disabling a destructive tool for a
/// given deployment).
pub struct Toolkit {
    pub name: String,
    pub guidelines: Option<String>,
    excluded: Vec<String>,
    provider: Box<dyn Fn() -> Vec<Tool> + Send + Sync>,
}

impl Toolkit {
    pub fn new(name: impl Into<String>, provider: impl Fn() -> Vec<Tool> + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            guidelines: None,
            excluded: Vec::new(),
            provider: Box::new(provider),
        }
    }

    pub fn with_guidelines(mut self, guidelines: impl Into<String>) -> Self {
        self.guidelines = Some(guidelines.into());
        self
    }

    pub fn exclude(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    /// Returns the toolkit's tools, filtered by the exclusion list.
    pub fn provide_tools(&self) -> Vec<Tool> {
        (self.provider)()
            .into_iter()
            .filter(|t| !self.excluded.contains(&t.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PropertyType;

    fn add_tool() -> Tool {
        tool("add")
            .description("Add two integers")
            .parameter(ToolProperty::integer("a", "first addend").required())
            .parameter(ToolProperty::integer("b", "second addend").required())
            .callable(|inputs| async move {
                let a = inputs.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = inputs.get("b").and_then(Value::as_i64).unwrap_or(0);
                Ok((a + b).to_string())
            })
            .build()
    }

    #[test]
    fn test_json_schema_has_required() {
        let t = add_tool();
        let schema = t.json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "integer");
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&Value::String("a".to_string())));
        assert!(required.contains(&Value::String("b".to_string())));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let t = add_tool();
        let mut inputs = Map::new();
        inputs.insert("a".to_string(), Value::from(2));
        inputs.insert("b".to_string(), Value::from(3));

        let result = t.execute(inputs, "call-1").await.unwrap();
        assert_eq!(result, "5");
        assert_eq!(t.get_result(), Some("5".to_string()));
        assert_eq!(t.last_call_id(), Some("call-1".to_string()));
    }

    #[tokio::test]
    async fn test_execute_missing_parameter() {
        let t = add_tool();
        let mut inputs = Map::new();
        inputs.insert("a".to_string(), Value::from(2));

        let err = t.execute(inputs, "call-1").await.unwrap_err();
        match err {
            Error::MissingParameter { tool_name, param_name } => {
                assert_eq!(tool_name, "add");
                assert_eq!(param_name, "b");
            }
            other => panic!("expected MissingParameter, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_callable_error_wraps() {
        let t = tool("boom")
            .description("always fails")
            .callable(|_inputs| async move { Err(Error::other("kaboom")) })
            .build();

        let err = t.execute(Map::new(), "call-1").await.unwrap_err();
        match err {
            Error::CallableError { tool_name, cause } => {
                assert_eq!(tool_name, "boom");
                assert!(cause.contains("kaboom"));
            }
            other => panic!("expected CallableError, got {other:?}"),
        }
    }

    #[test]
    fn test_toolkit_exclusion() {
        let toolkit = Toolkit::new("math", || {
            vec![
                Tool::new("add", "add", vec![]),
                Tool::new("sub", "subtract", vec![]),
            ]
        })
        .with_guidelines("Use for arithmetic only")
        .exclude(["sub"]);

        let tools = toolkit.provide_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");
        assert_eq!(toolkit.guidelines.as_deref(), Some("Use for arithmetic only"));
    }

    #[test]
    fn test_array_and_object_parameters() {
        let tags = ToolProperty::array("tags", "tags to apply", ToolProperty::string("tag", "one tag"));
        let nested = ToolProperty::object(
            "address",
            "mailing address",
            vec![ToolProperty::string("city", "city").required()],
        );
        let t = Tool::new(
            "file",
            "file a report",
            vec![tags, nested, ToolProperty::new("priority", PropertyType::Integer, "priority")],
        );
        let schema = t.json_schema();
        assert_eq!(schema["properties"]["tags"]["type"], "array");
        assert_eq!(schema["properties"]["address"]["type"], "object");
        assert_eq!(
            schema["properties"]["address"]["required"],
            serde_json::json!(["city"])
        );
    }
}
