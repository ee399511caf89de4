//! Observer Bus: synchronous, topic-filtered, read-only event fan-out.
//!
//! Observers subscribe to a glob topic pattern (`*` matches any run of
//! characters within a segment; the literal topic always matches itself).
//! Every publish synchronously invokes every matching observer in
//! registration order. Observers cannot veto or alter anything they are
//! told about — that capability belongs to [`crate::hooks`]. A panicking
//! observer is caught, logged via `tracing::warn!`, and does not stop the
//! remaining observers from running or abort the agent's own operation.

use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Event topics named exhaustively by SPEC_FULL §4.6.
pub mod topics {
    pub const CHAT_START: &str = "chat-start";
    pub const CHAT_STOP: &str = "chat-stop";
    pub const INFERENCE_START: &str = "inference-start";
    pub const INFERENCE_STOP: &str = "inference-stop";
    pub const TOOL_CALLING: &str = "tool-calling";
    pub const TOOL_CALLED: &str = "tool-called";
    pub const STRUCTURED_EXTRACTING: &str = "structured-extracting";
    pub const STRUCTURED_EXTRACTED: &str = "structured-extracted";
    pub const ERROR: &str = "error";

    pub const RAG_ANSWER_START: &str = "rag-answer-start";
    pub const RAG_ANSWER_STOP: &str = "rag-answer-stop";
    pub const RAG_RETRIEVAL_START: &str = "rag-retrieval-start";
    pub const RAG_RETRIEVAL_STOP: &str = "rag-retrieval-stop";
    pub const RAG_VECTORSTORE_SEARCHING: &str = "rag-vectorstore-searching";
    pub const RAG_VECTORSTORE_RESULT: &str = "rag-vectorstore-result";
    pub const RAG_POSTPROCESSING_START: &str = "rag-postprocessing-start";
    pub const RAG_POSTPROCESSING_END: &str = "rag-postprocessing-end";
    pub const RAG_ADDDOCUMENTS_START: &str = "rag-adddocuments-start";
    pub const RAG_ADDDOCUMENTS_STOP: &str = "rag-adddocuments-stop";

    pub const WORKFLOW_START: &str = "workflow-start";
    pub const WORKFLOW_NODE_ENTER: &str = "workflow-node-enter";
    pub const WORKFLOW_NODE_EXIT: &str = "workflow-node-exit";
    pub const WORKFLOW_INTERRUPT: &str = "workflow-interrupt";
    pub const WORKFLOW_RESUME: &str = "workflow-resume";
    pub const WORKFLOW_STOP: &str = "workflow-stop";
}

/// A single notification published on the bus.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

type ObserverFn = Arc<dyn Fn(Event) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Subscription {
    pattern: String,
    handler: ObserverFn,
}

/// Matches `pattern` against `topic`, where `*` in `pattern` matches any run of
/// characters (including none, including `-`). No other glob metacharacters are
/// supported.
fn glob_match(pattern: &str, topic: &str) -> bool {
    fn helper(pattern: &[u8], topic: &[u8]) -> bool {
        match pattern.first() {
            None => topic.is_empty(),
            Some(b'*') => {
                for i in 0..=topic.len() {
                    if helper(&pattern[1..], &topic[i..]) {
                        return true;
                    }
                }
                false
            }
            Some(&c) => topic.first() == Some(&c) && helper(&pattern[1..], &topic[1..]),
        }
    }
    helper(pattern.as_bytes(), topic.as_bytes())
}

/// The Observer Bus: a registry of topic-filtered subscriptions plus a
/// synchronous `publish`.
#[derive(Default)]
pub struct Observers {
    subscriptions: Vec<Subscription>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every topic matching `pattern` (supports `*`).
    pub fn subscribe<F, Fut>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            pattern: pattern.into(),
            handler: Arc::new(move |event| Box::pin(handler(event))),
        });
    }

    /// Synchronously fans `event` out to every subscription whose pattern
    /// matches `event.topic`, in registration order. A panicking observer is
    /// caught and logged; it does not prevent later observers from running.
    pub async fn publish(&self, event: Event) {
        for sub in &self.subscriptions {
            if !glob_match(&sub.pattern, &event.topic) {
                continue;
            }
            let fut = (sub.handler)(event.clone());
            let result = std::panic::AssertUnwindSafe(fut).catch_unwind_or_warn(&event.topic).await;
            let _ = result;
        }
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Extension trait providing panic-contained polling of an observer future.
trait CatchUnwindOrWarn {
    fn catch_unwind_or_warn(self, topic: &str) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<F> CatchUnwindOrWarn for AssertUnwindSafe<F>
where
    F: Future<Output = ()> + Send + 'static,
{
    fn catch_unwind_or_warn(self, topic: &str) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let fut = self.0;
            match futures::FutureExt::catch_unwind(AssertUnwindSafe(fut)).await {
                Ok(()) => {}
                Err(_) => {
                    tracing::warn!(topic = %topic, "observer panicked, continuing");
                }
            }
        })
    }
}
