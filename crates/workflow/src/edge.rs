//! Edge definitions.

use cascade_core::{HandleType, NodeKey};
use serde::{Deserialize, Serialize};

/// A directed edge between two nodes in the authoring format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Unique edge identifier. If omitted, the builder derives one from
    /// `source`, `target`, and the handle.
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source: NodeKey,
    /// Target node id.
    pub target: NodeKey,
    /// Named output port on the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Named input port on the target, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    /// The handle driving this edge's liveness.
    #[serde(default)]
    pub handle_type: HandleType,
}

impl EdgeDefinition {
    /// Create a plain data edge.
    pub fn new(source: NodeKey, target: NodeKey) -> Self {
        Self::with_handle(source, target, HandleType::Default)
    }

    /// Create an edge attached to a specific handle.
    pub fn with_handle(source: NodeKey, target: NodeKey, handle_type: HandleType) -> Self {
        Self {
            id: format!("{source}:{}:{target}", handle_type.as_str()),
            source,
            target,
            source_handle: None,
            target_handle: None,
            handle_type,
        }
    }

    /// Returns `true` if this edge is a loop-back control edge. Loop-back
    /// edges are never data dependencies.
    #[must_use]
    pub fn is_loop_back(&self) -> bool {
        self.handle_type == HandleType::LoopBack
    }
}
