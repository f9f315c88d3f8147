//! The node handler contract.
//!
//! A handler receives an interpolated config, an immutable context
//! snapshot, and execution metadata; it returns a JSON-object output plus
//! optional variable writes. Handlers are pure with respect to the engine:
//! they never mutate the snapshot — the scheduler adopts what they return.

use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::{ExecutionId, NodeKey, WorkflowId};
use cascade_eventbus::{EventBus, ExecutionEvent};
use cascade_execution::ContextSnapshot;
use cascade_workflow::NodeType;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::wait::WaitCoordinator;

/// A failure inside a node handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// The node's config is missing or malformed.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The handler's work failed.
    #[error("{0}")]
    Execution(String),

    /// An external-service handler has no transport wired in.
    #[error("no transport configured for {0} nodes")]
    TransportMissing(&'static str),

    /// The handler observed cancellation and stopped.
    #[error("cancelled")]
    Cancelled,
}

/// What a handler hands back to the scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutput {
    /// The node's output object, stored in the context snapshot. Flow
    /// control rides inside it: conditionals set `selectedBranch`, loop
    /// ends set `continueLoop`.
    pub output: Map<String, Value>,
    /// Workflow variables to set when the scheduler adopts this output.
    pub set_variables: Map<String, Value>,
}

impl HandlerOutput {
    /// An output with no variable writes.
    #[must_use]
    pub fn new(output: Map<String, Value>) -> Self {
        Self {
            output,
            set_variables: Map::new(),
        }
    }

    /// Build from a JSON value; non-objects are wrapped under `"value"`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let output = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_owned(), other);
                map
            }
        };
        Self::new(output)
    }

    /// Add a variable write.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set_variables.insert(name.into(), value);
        self
    }
}

/// Shared services handlers may use: the event bus for streaming and the
/// wait coordinator for suspension.
#[derive(Clone)]
pub struct HandlerServices {
    /// The per-execution event bus.
    pub bus: Arc<EventBus>,
    /// The pending-wait table.
    pub waits: Arc<WaitCoordinator>,
}

impl std::fmt::Debug for HandlerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerServices").finish_non_exhaustive()
    }
}

/// Everything a handler invocation sees.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// The execution this node runs in.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The node being executed.
    pub node: NodeKey,
    /// The node's type tag.
    pub node_type: NodeType,
    /// The node's config, with every `{{...}}` already interpolated
    /// against the snapshot.
    pub config: Map<String, Value>,
    /// Immutable context as of dispatch.
    pub snapshot: ContextSnapshot,
    /// This node's dependencies, in graph order.
    pub dependencies: Vec<NodeKey>,
    /// The loop context this node controls or terminates, if any.
    pub loop_context: Option<cascade_workflow::LoopContext>,
    /// Cooperative cancellation for this invocation.
    pub cancellation: CancellationToken,
    /// Bus and wait coordinator handles.
    pub services: HandlerServices,
}

impl HandlerContext {
    /// Emit one streamed output token for this node.
    pub fn emit_token(&self, token: impl Into<String>) {
        self.services.bus.emit(ExecutionEvent::Token {
            execution_id: self.execution_id,
            node: self.node.clone(),
            token: token.into(),
        });
    }

    /// Emit a thinking-phase start marker.
    pub fn emit_thinking_start(&self) {
        self.services.bus.emit(ExecutionEvent::ThinkingStart {
            execution_id: self.execution_id,
            node: self.node.clone(),
        });
    }

    /// Emit one reasoning token.
    pub fn emit_thinking_token(&self, token: impl Into<String>) {
        self.services.bus.emit(ExecutionEvent::ThinkingToken {
            execution_id: self.execution_id,
            node: self.node.clone(),
            token: token.into(),
        });
    }

    /// Emit a thinking-phase end marker.
    pub fn emit_thinking_complete(&self) {
        self.services.bus.emit(ExecutionEvent::ThinkingComplete {
            execution_id: self.execution_id,
            node: self.node.clone(),
        });
    }

    /// A config field, if present.
    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// A config field as a string slice.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// One registered node handler.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Execute the node. The returned output is adopted by the scheduler;
    /// returning an error fails the node (subject to its error policy).
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn from_value_keeps_objects() {
        let out = HandlerOutput::from_value(json!({"a": 1}));
        assert_eq!(out.output.get("a"), Some(&json!(1)));
        assert!(out.set_variables.is_empty());
    }

    #[test]
    fn from_value_wraps_scalars() {
        let out = HandlerOutput::from_value(json!(42));
        assert_eq!(out.output.get("value"), Some(&json!(42)));
    }

    #[test]
    fn with_variable_accumulates() {
        let out = HandlerOutput::default()
            .with_variable("a", json!(1))
            .with_variable("b", json!("x"));
        assert_eq!(out.set_variables.len(), 2);
    }

    #[test]
    fn handler_error_display() {
        assert_eq!(
            HandlerError::InvalidConfig("missing url".into()).to_string(),
            "invalid config: missing url"
        );
        assert_eq!(
            HandlerError::TransportMissing("llm").to_string(),
            "no transport configured for llm nodes"
        );
        assert_eq!(HandlerError::Cancelled.to_string(), "cancelled");
    }
}
