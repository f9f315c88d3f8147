//! Per-node lifecycle states.

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// The lifecycle state of a node within a running execution.
///
/// The queue partitions every node into exactly one of these buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting on unsettled dependencies.
    Pending,
    /// All dependencies settled and a live incoming edge exists.
    Ready,
    /// Dispatched to a handler (waits park here too).
    Executing,
    /// Handler finished successfully.
    Completed,
    /// Handler failed, or an upstream failure cascaded here.
    Failed,
    /// No live path selected this node.
    Skipped,
}

impl NodeState {
    /// Returns `true` once the node can no longer run in this iteration.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns `true` if the node counts as a satisfied dependency.
    /// Failed nodes never satisfy a dependency — they cascade instead.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Returns `true` if the node-level transition from `from` to `to` is valid.
///
/// `Completed → Pending` and `Skipped → Pending` are the loop-iteration
/// reset edges; no other terminal state may be left.
#[must_use]
pub fn can_transition(from: NodeState, to: NodeState) -> bool {
    matches!(
        (from, to),
        (NodeState::Pending, NodeState::Ready)
            | (NodeState::Pending, NodeState::Skipped)
            | (NodeState::Pending, NodeState::Failed)
            | (NodeState::Ready, NodeState::Executing)
            | (NodeState::Ready, NodeState::Skipped)
            | (NodeState::Ready, NodeState::Failed)
            | (NodeState::Executing, NodeState::Completed)
            | (NodeState::Executing, NodeState::Failed)
            | (NodeState::Completed, NodeState::Pending)
            | (NodeState::Skipped, NodeState::Pending)
    )
}

/// Validate a node-level transition, returning an error if invalid.
pub fn validate_transition(from: NodeState, to: NodeState) -> Result<(), WorkflowError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
