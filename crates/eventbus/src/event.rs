//! Execution lifecycle and streaming events.

use cascade_core::{ErrorKind, ExecutionId, NodeKey, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event on one execution's stream.
///
/// These are projections emitted as the execution progresses — **not** the
/// source of truth. The serde tag doubles as the SSE `event:` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// First event on every new subscription.
    Connected {
        /// The execution subscribed to.
        execution_id: ExecutionId,
    },
    /// The execution has started.
    ExecutionStarted {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The workflow being executed.
        workflow_id: WorkflowId,
        /// Number of nodes in the graph.
        total_nodes: usize,
    },
    /// Periodic progress summary.
    ExecutionProgress {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// Nodes settled so far.
        completed: usize,
        /// Total nodes.
        total: usize,
    },
    /// A node was dispatched to its handler.
    NodeStarted {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node.
        node: NodeKey,
    },
    /// A node completed successfully.
    NodeCompleted {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node.
        node: NodeKey,
        /// The node's output object.
        output: Value,
    },
    /// A node failed.
    NodeFailed {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node.
        node: NodeKey,
        /// The failure message.
        error: String,
    },
    /// A node was skipped.
    NodeSkipped {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node.
        node: NodeKey,
    },
    /// A loop finished one body pass.
    IterationCompleted {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The loop controller node.
        loop_node: NodeKey,
        /// The just-completed iteration index (0-based).
        iteration: u32,
    },
    /// An LLM handler entered its reasoning phase.
    ThinkingStart {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node streaming.
        node: NodeKey,
    },
    /// One reasoning token.
    ThinkingToken {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node streaming.
        node: NodeKey,
        /// The token text.
        token: String,
    },
    /// The reasoning phase ended.
    ThinkingComplete {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node streaming.
        node: NodeKey,
    },
    /// One output token.
    Token {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node streaming.
        node: NodeKey,
        /// The token text.
        token: String,
    },
    /// A structured plan was detected in streamed output.
    PlanDetected {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The node streaming.
        node: NodeKey,
        /// The extracted plan.
        plan: Value,
    },
    /// Terminal: the execution completed; carries the final outputs.
    Complete {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The merged final outputs.
        outputs: Value,
    },
    /// Terminal: an internal error outside any node.
    Error {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The error message.
        message: String,
    },
    /// Terminal: the execution failed.
    Failed {
        /// The execution identifier.
        execution_id: ExecutionId,
        /// The failure classification.
        kind: ErrorKind,
        /// The failure message.
        message: String,
        /// The node at fault, when attributable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<NodeKey>,
    },
    /// The execution is paused awaiting an external signal.
    Paused {
        /// The execution identifier.
        execution_id: ExecutionId,
    },
}

impl ExecutionEvent {
    /// The wire name of this event (the SSE `event:` field).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ExecutionStarted { .. } => "execution_started",
            Self::ExecutionProgress { .. } => "execution_progress",
            Self::NodeStarted { .. } => "node_started",
            Self::NodeCompleted { .. } => "node_completed",
            Self::NodeFailed { .. } => "node_failed",
            Self::NodeSkipped { .. } => "node_skipped",
            Self::IterationCompleted { .. } => "iteration_completed",
            Self::ThinkingStart { .. } => "thinking_start",
            Self::ThinkingToken { .. } => "thinking_token",
            Self::ThinkingComplete { .. } => "thinking_complete",
            Self::Token { .. } => "token",
            Self::PlanDetected { .. } => "plan_detected",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Failed { .. } => "failed",
            Self::Paused { .. } => "paused",
        }
    }

    /// Terminal events trigger the flush-then-close sequence on
    /// subscribers.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Error { .. } | Self::Failed { .. }
        )
    }

    /// The execution this event belongs to.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Self::Connected { execution_id }
            | Self::ExecutionStarted { execution_id, .. }
            | Self::ExecutionProgress { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::NodeSkipped { execution_id, .. }
            | Self::IterationCompleted { execution_id, .. }
            | Self::ThinkingStart { execution_id, .. }
            | Self::ThinkingToken { execution_id, .. }
            | Self::ThinkingComplete { execution_id, .. }
            | Self::Token { execution_id, .. }
            | Self::PlanDetected { execution_id, .. }
            | Self::Complete { execution_id, .. }
            | Self::Error { execution_id, .. }
            | Self::Failed { execution_id, .. }
            | Self::Paused { execution_id } => *execution_id,
        }
    }

    /// The event payload as minified JSON (the SSE `data:` field).
    #[must_use]
    pub fn data_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}
