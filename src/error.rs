//! Error types for the agent framework.
//!
//! One `thiserror`-derived enum covers every propagating failure mode named in the
//! error-handling design: provider/transport issues, agent misconfiguration, tool
//! dispatch failures, retrieval and embedding failures, and workflow graph errors.
//!
//! `WorkflowInterrupt` is deliberately not a variant here — it is a control-flow
//! signal, not an error, and is modeled by [`crate::workflow::NodeOutcome`] instead.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error type for the agent framework.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport failure (connection refused, DNS, TLS, etc).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request exceeded its configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// SSE/NDJSON stream parsing failure.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Invalid configuration (bad builder input, invalid base URL, etc).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input supplied by the caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A provider backend returned a wire-level error.
    ///
    /// Carries the optional HTTP status code and a bounded excerpt of the response
    /// body, per the error-handling design's "status code and bounded body excerpt"
    /// requirement.
    #[error("Provider error: {message}{}", status_code.map(|c| format!(" (status {c})")).unwrap_or_default())]
    Provider {
        message: String,
        status_code: Option<u16>,
        body: Option<String>,
    },

    /// Agent misconfiguration or invalid operation (e.g. RAG query with empty content).
    #[error("Agent error: {0}")]
    Agent(String),

    /// A required tool parameter was absent from the call arguments.
    #[error("Tool '{tool_name}' is missing required parameter '{param_name}'")]
    MissingParameter { tool_name: String, param_name: String },

    /// A tool's callable body returned an error during execution.
    #[error("Tool '{tool_name}' failed: {cause}")]
    CallableError { tool_name: String, cause: String },

    /// Vector store ingest/search failure (including dimension mismatch).
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Embedding provider failure.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Post-processor (reranker) failure.
    #[error("Post-processor error: {0}")]
    PostProcessor(String),

    /// Workflow graph misconfiguration or node runtime failure.
    #[error("Workflow error: {0}")]
    Workflow(String),

    /// Chat history persistence IO failure.
    #[error("Chat history error: {0}")]
    ChatHistory(String),

    /// Catch-all for errors that don't fit another variant.
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    pub fn timeout() -> Self {
        Error::Timeout
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Error::Provider {
            message: message.into(),
            status_code: None,
            body: None,
        }
    }

    pub fn provider_with_status(
        message: impl Into<String>,
        status_code: u16,
        body: impl Into<String>,
    ) -> Self {
        const MAX_BODY_EXCERPT: usize = 2048;
        let mut body = body.into();
        if body.len() > MAX_BODY_EXCERPT {
            body.truncate(MAX_BODY_EXCERPT);
            body.push_str("...(truncated)");
        }
        Error::Provider {
            message: message.into(),
            status_code: Some(status_code),
            body: Some(body),
        }
    }

    pub fn agent(msg: impl Into<String>) -> Self {
        Error::Agent(msg.into())
    }

    pub fn missing_parameter(tool_name: impl Into<String>, param_name: impl Into<String>) -> Self {
        Error::MissingParameter {
            tool_name: tool_name.into(),
            param_name: param_name.into(),
        }
    }

    pub fn callable_error(tool_name: impl Into<String>, cause: impl Into<String>) -> Self {
        Error::CallableError {
            tool_name: tool_name.into(),
            cause: cause.into(),
        }
    }

    pub fn vector_store(msg: impl Into<String>) -> Self {
        Error::VectorStore(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Error::Embedding(msg.into())
    }

    pub fn post_processor(msg: impl Into<String>) -> Self {
        Error::PostProcessor(msg.into())
    }

    pub fn workflow(msg: impl Into<String>) -> Self {
        Error::Workflow(msg.into())
    }

    pub fn chat_history(msg: impl Into<String>) -> Self {
        Error::ChatHistory(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Legacy alias kept for call sites that previously targeted the teacher's
    /// `Error::api` constructor; maps onto `Error::provider`.
    pub fn api(msg: impl Into<String>) -> Self {
        Error::provider(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::timeout().to_string(), "Request timed out");
        assert_eq!(
            Error::config("bad url").to_string(),
            "Configuration error: bad url"
        );
        assert_eq!(
            Error::missing_parameter("weather", "location").to_string(),
            "Tool 'weather' is missing required parameter 'location'"
        );
    }

    #[test]
    fn test_provider_error_truncates_body() {
        let long_body = "x".repeat(3000);
        let err = Error::provider_with_status("bad request", 400, long_body);
        match err {
            Error::Provider { body: Some(b), status_code: Some(c), .. } => {
                assert_eq!(c, 400);
                assert!(b.len() < 3000);
                assert!(b.ends_with("...(truncated)"));
            }
            _ => panic!("expected Provider variant"),
        }
    }

    #[test]
    fn test_callable_error_contains_tool_name() {
        let err = Error::callable_error("add", "division by zero");
        assert!(err.to_string().contains("add"));
        assert!(err.to_string().contains("division by zero"));
    }
}
