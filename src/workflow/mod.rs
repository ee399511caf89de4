//! Resumable workflow engine (§4.5): a directed graph of [`Node`]s threaded
//! through a mutable [`WorkflowContext`], with explicit interrupt/resume
//! support for human-in-the-loop or long-running external steps.

pub mod mermaid;
pub mod persistence;

use crate::observer::{topics, Event, Observers};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub use persistence::{FileWorkflowPersistence, InMemoryWorkflowPersistence, WorkflowPersistence};

/// The saved state of a paused workflow run (§6 "Workflow persistence format").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInterrupt {
    pub workflow_id: String,
    pub node_id: String,
    pub data: Option<Value>,
    pub state: Value,
}

/// The execution context threaded through a workflow run, mutated by nodes
/// via [`WorkflowContext::interrupt`].
pub struct WorkflowContext {
    pub workflow_id: String,
    pub current_node_id: String,
    pub current_state: Value,
    pub is_resuming: bool,
    pub feedback_for_node: Option<Value>,
    pending_interrupt: Option<Option<Value>>,
}

impl WorkflowContext {
    /// Called by a node that wants to suspend the workflow. If this run is
    /// resuming and feedback is pending for this node, consumes and returns
    /// it so the node can continue synchronously. Otherwise records the
    /// intent to interrupt; the node must then return
    /// [`NodeOutcome::Interrupted`] (§4.5 "Interruption").
    pub fn interrupt(&mut self, data_to_save: Option<Value>) -> Option<Value> {
        if self.is_resuming {
            if let Some(feedback) = self.feedback_for_node.take() {
                self.is_resuming = false;
                return Some(feedback);
            }
        }
        self.pending_interrupt = Some(data_to_save);
        None
    }

    fn take_pending_interrupt(&mut self) -> Option<Option<Value>> {
        self.pending_interrupt.take()
    }
}

/// The result of a single node invocation.
pub enum NodeOutcome {
    /// The node ran to completion; carries the updated workflow state.
    Completed(Value),
    /// The node called [`WorkflowContext::interrupt`] and is suspended.
    Interrupted,
}

/// A single step in a workflow graph.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, ctx: &mut WorkflowContext) -> Result<NodeOutcome>;
}

pub type EdgeCondition = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

struct Edge {
    to: String,
    condition: Option<EdgeCondition>,
}

/// A directed graph of [`Node`]s (§4.5 "Graph construction").
pub struct Workflow {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: HashMap<String, Vec<Edge>>,
    start_node_id: Option<String>,
    end_node_id: Option<String>,
    persistence: Option<Arc<dyn WorkflowPersistence>>,
    observers: Observers,
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            start_node_id: None,
            end_node_id: None,
            persistence: None,
            observers: Observers::new(),
        }
    }

    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.id().to_string(), node);
        self
    }

    /// Adds an edge from `from` to `to`. `condition`, when present, must
    /// return true for the edge to be taken; edges for a given source are
    /// tried in the order they were added, first match wins.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>, condition: Option<EdgeCondition>) -> Self {
        self.edges.entry(from.into()).or_default().push(Edge { to: to.into(), condition });
        self
    }

    pub fn set_start_node_id(mut self, id: impl Into<String>) -> Self {
        self.start_node_id = Some(id.into());
        self
    }

    pub fn set_end_node_id(mut self, id: impl Into<String>) -> Self {
        self.end_node_id = Some(id.into());
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn WorkflowPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    fn validate(&self) -> Result<&str> {
        let start = self
            .start_node_id
            .as_deref()
            .ok_or_else(|| Error::workflow("no start node configured"))?;
        if !self.nodes.contains_key(start) {
            return Err(Error::workflow(format!("start node '{start}' is not registered")));
        }
        for (from, edges) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(Error::workflow(format!("edge source '{from}' is not a registered node")));
            }
            for edge in edges {
                if !self.nodes.contains_key(&edge.to) {
                    return Err(Error::workflow(format!("edge target '{}' is not a registered node", edge.to)));
                }
            }
        }
        Ok(start)
    }

    /// Runs the graph from `start_node_id` with `initial_state` (§4.5
    /// "Execution semantics").
    pub async fn run(&self, initial_state: Value) -> Result<WorkflowOutcome> {
        let start = self.validate()?.to_string();
        let workflow_id = Uuid::new_v4().to_string();
        let mut ctx = WorkflowContext {
            workflow_id: workflow_id.clone(),
            current_node_id: start,
            current_state: initial_state,
            is_resuming: false,
            feedback_for_node: None,
            pending_interrupt: None,
        };
        self.publish(topics::WORKFLOW_START, &ctx.workflow_id, None, Value::Null).await;
        self.execute_loop(ctx).await
    }

    /// Resumes a previously interrupted run using `feedback` and the saved
    /// state loaded from the configured persistence layer (§4.5
    /// "Resumption").
    pub async fn resume(&self, workflow_id: impl Into<String>, feedback: Option<Value>) -> Result<WorkflowOutcome> {
        let workflow_id = workflow_id.into();
        let persistence = self
            .persistence
            .as_ref()
            .ok_or_else(|| Error::workflow("no persistence layer configured"))?;
        let saved = persistence
            .load(&workflow_id)
            .await?
            .ok_or_else(|| Error::workflow("no saved state"))?;

        self.validate()?;
        let ctx = WorkflowContext {
            workflow_id: workflow_id.clone(),
            current_node_id: saved.node_id,
            current_state: saved.state,
            is_resuming: true,
            feedback_for_node: feedback,
            pending_interrupt: None,
        };
        self.publish(topics::WORKFLOW_RESUME, &workflow_id, None, Value::Null).await;
        let outcome = self.execute_loop(ctx).await?;
        if let WorkflowOutcome::Completed(_) = &outcome {
            persistence.delete(&workflow_id).await?;
        }
        Ok(outcome)
    }

    async fn execute_loop(&self, mut ctx: WorkflowContext) -> Result<WorkflowOutcome> {
        loop {
            let node = self
                .nodes
                .get(&ctx.current_node_id)
                .ok_or_else(|| Error::workflow(format!("node '{}' is not registered", ctx.current_node_id)))?
                .clone();

            self.publish(topics::WORKFLOW_NODE_ENTER, &ctx.workflow_id, Some(&ctx.current_node_id), Value::Null).await;
            let outcome = node.run(&mut ctx).await?;
            self.publish(topics::WORKFLOW_NODE_EXIT, &ctx.workflow_id, Some(&ctx.current_node_id), Value::Null).await;

            let new_state = match outcome {
                NodeOutcome::Completed(state) => state,
                NodeOutcome::Interrupted => {
                    let data_to_save = ctx
                        .take_pending_interrupt()
                        .ok_or_else(|| Error::workflow("node returned Interrupted without calling context.interrupt"))?;
                    let state = merge_state(&ctx.current_state, data_to_save.as_ref());
                    let interrupt = WorkflowInterrupt {
                        workflow_id: ctx.workflow_id.clone(),
                        node_id: ctx.current_node_id.clone(),
                        data: data_to_save,
                        state: state.clone(),
                    };
                    if let Some(persistence) = &self.persistence {
                        persistence.save(&ctx.workflow_id, &interrupt).await?;
                    }
                    self.publish(topics::WORKFLOW_INTERRUPT, &ctx.workflow_id, Some(&ctx.current_node_id), Value::Null).await;
                    return Ok(WorkflowOutcome::Interrupted(interrupt));
                }
            };
            ctx.current_state = new_state;

            if self.end_node_id.as_deref() == Some(ctx.current_node_id.as_str()) {
                self.publish(topics::WORKFLOW_STOP, &ctx.workflow_id, None, Value::Null).await;
                return Ok(WorkflowOutcome::Completed(ctx.current_state));
            }

            match self.find_next_node(&ctx.current_node_id, &ctx.current_state) {
                Some(next_id) => ctx.current_node_id = next_id,
                None => {
                    self.publish(topics::WORKFLOW_STOP, &ctx.workflow_id, None, Value::Null).await;
                    return Ok(WorkflowOutcome::Completed(ctx.current_state));
                }
            }
        }
    }

    fn find_next_node(&self, from: &str, state: &Value) -> Option<String> {
        let edges = self.edges.get(from)?;
        edges
            .iter()
            .find(|edge| edge.condition.as_ref().map(|cond| cond(state)).unwrap_or(true))
            .map(|edge| edge.to.clone())
    }

    async fn publish(&self, topic: &str, workflow_id: &str, node_id: Option<&str>, extra: Value) {
        let mut payload = serde_json::json!({"workflow_id": workflow_id});
        if let Some(node_id) = node_id {
            payload["node_id"] = Value::String(node_id.to_string());
        }
        if let Value::Object(extra) = extra {
            if let Value::Object(map) = &mut payload {
                map.extend(extra);
            }
        }
        self.observers.publish(Event::new(topic, payload)).await;
    }

    /// Renders the graph as a Mermaid flowchart (§4.5 "Export").
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();
        for id in &ids {
            let sanitized = mermaid::sanitize_node_id(id);
            let label = mermaid::escape_label(id);
            out.push_str(&format!("    {sanitized}[\"{label}\"]\n"));
            if self.start_node_id.as_deref() == Some(id.as_str()) {
                out.push_str(&format!("    style {sanitized} fill:#9f9,stroke:#333\n"));
            }
            if self.end_node_id.as_deref() == Some(id.as_str()) {
                out.push_str(&format!("    style {sanitized} fill:#f99,stroke:#333\n"));
            }
        }
        let mut from_ids: Vec<&String> = self.edges.keys().collect();
        from_ids.sort();
        for from in from_ids {
            let edges = &self.edges[from];
            let from_sanitized = mermaid::sanitize_node_id(from);
            for edge in edges {
                let to_sanitized = mermaid::sanitize_node_id(&edge.to);
                if edge.condition.is_some() {
                    out.push_str(&format!("    {from_sanitized} -->|Conditional| {to_sanitized}\n"));
                } else {
                    out.push_str(&format!("    {from_sanitized} --> {to_sanitized}\n"));
                }
            }
        }
        out
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_state(current: &Value, data_to_save: Option<&Value>) -> Value {
    match (current, data_to_save) {
        (Value::Object(base), Some(Value::Object(extra))) => {
            let mut merged = base.clone();
            merged.extend(extra.clone());
            Value::Object(merged)
        }
        (_, Some(extra)) => extra.clone(),
        (base, None) => base.clone(),
    }
}

/// The outcome of a workflow run or resumption.
pub enum WorkflowOutcome {
    Completed(Value),
    Interrupted(WorkflowInterrupt),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct IncrementNode {
        id: String,
    }

    #[async_trait]
    impl Node for IncrementNode {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, ctx: &mut WorkflowContext) -> Result<NodeOutcome> {
            let count = ctx.current_state.get("count").and_then(Value::as_i64).unwrap_or(0);
            Ok(NodeOutcome::Completed(serde_json::json!({"count": count + 1})))
        }
    }

    struct ApprovalNode {
        id: String,
    }

    #[async_trait]
    impl Node for ApprovalNode {
        fn id(&self) -> &str {
            &self.id
        }

        async fn run(&self, ctx: &mut WorkflowContext) -> Result<NodeOutcome> {
            match ctx.interrupt(Some(serde_json::json!({"awaiting": "approval"}))) {
                Some(feedback) => Ok(NodeOutcome::Completed(serde_json::json!({"approved": feedback}))),
                None => Ok(NodeOutcome::Interrupted),
            }
        }
    }

    #[tokio::test]
    async fn test_run_rejects_missing_start_node() {
        let workflow = Workflow::new().add_node(Arc::new(IncrementNode { id: "a".into() }));
        let err = workflow.run(Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Workflow(_)));
    }

    #[tokio::test]
    async fn test_run_terminates_at_end_node_with_no_outgoing_edges() {
        let workflow = Workflow::new()
            .add_node(Arc::new(IncrementNode { id: "start".into() }))
            .set_start_node_id("start")
            .set_end_node_id("start");

        let outcome = workflow.run(serde_json::json!({"count": 0})).await.unwrap();
        match outcome {
            WorkflowOutcome::Completed(state) => assert_eq!(state["count"], 1),
            WorkflowOutcome::Interrupted(_) => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_run_follows_edges_to_next_node() {
        let workflow = Workflow::new()
            .add_node(Arc::new(IncrementNode { id: "a".into() }))
            .add_node(Arc::new(IncrementNode { id: "b".into() }))
            .add_edge("a", "b", None)
            .set_start_node_id("a")
            .set_end_node_id("b");

        let outcome = workflow.run(serde_json::json!({"count": 0})).await.unwrap();
        match outcome {
            WorkflowOutcome::Completed(state) => assert_eq!(state["count"], 2),
            WorkflowOutcome::Interrupted(_) => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_conditional_edge_picks_first_matching() {
        let taken = Arc::new(AtomicUsize::new(0));
        let taken_clone = taken.clone();
        let workflow = Workflow::new()
            .add_node(Arc::new(IncrementNode { id: "a".into() }))
            .add_node(Arc::new(IncrementNode { id: "low".into() }))
            .add_node(Arc::new(IncrementNode { id: "high".into() }))
            .add_edge("a", "low", Some(Arc::new(move |state: &Value| {
                taken_clone.fetch_add(1, Ordering::SeqCst);
                state["count"].as_i64().unwrap_or(0) < 10
            })))
            .add_edge("a", "high", None)
            .set_start_node_id("a")
            .set_end_node_id("low");

        let outcome = workflow.run(serde_json::json!({"count": 0})).await.unwrap();
        assert_eq!(taken.load(Ordering::SeqCst), 1);
        match outcome {
            WorkflowOutcome::Completed(state) => assert_eq!(state["count"], 2),
            WorkflowOutcome::Interrupted(_) => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_interrupt_then_resume_consumes_feedback_once() {
        let persistence: Arc<dyn WorkflowPersistence> = Arc::new(InMemoryWorkflowPersistence::new());
        let workflow = Workflow::new()
            .add_node(Arc::new(ApprovalNode { id: "approve".into() }))
            .set_start_node_id("approve")
            .set_end_node_id("approve")
            .with_persistence(persistence);

        let outcome = workflow.run(serde_json::json!({})).await.unwrap();
        let workflow_id = match outcome {
            WorkflowOutcome::Interrupted(interrupt) => {
                assert_eq!(interrupt.node_id, "approve");
                interrupt.workflow_id
            }
            WorkflowOutcome::Completed(_) => panic!("expected interruption"),
        };

        let resumed = workflow.resume(&workflow_id, Some(serde_json::json!("yes"))).await.unwrap();
        match resumed {
            WorkflowOutcome::Completed(state) => assert_eq!(state["approved"], "yes"),
            WorkflowOutcome::Interrupted(_) => panic!("expected completion after resume"),
        }
    }

    #[tokio::test]
    async fn test_resume_without_persistence_fails() {
        let workflow = Workflow::new()
            .add_node(Arc::new(ApprovalNode { id: "approve".into() }))
            .set_start_node_id("approve");
        let err = workflow.resume("missing-id", None).await.unwrap_err();
        assert!(matches!(err, Error::Workflow(_)));
    }

    #[test]
    fn test_to_mermaid_marks_start_and_end_and_conditional_edges() {
        let workflow = Workflow::new()
            .add_node(Arc::new(IncrementNode { id: "fetch data".into() }))
            .add_node(Arc::new(IncrementNode { id: "done".into() }))
            .add_edge("fetch data", "done", Some(Arc::new(|_: &Value| true)))
            .set_start_node_id("fetch data")
            .set_end_node_id("done");

        let diagram = workflow.to_mermaid();
        assert!(diagram.contains("fetch_data"));
        assert!(diagram.contains("-->|Conditional|"));
        assert!(diagram.contains("fill:#9f9"));
        assert!(diagram.contains("fill:#f99"));
    }
}
