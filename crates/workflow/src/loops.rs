//! Loop contexts.
//!
//! A loop is modelled as a controller node plus an explicit body region
//! bracketed by start/end sentinels. The graph stays acyclic: the
//! `loop-back` edge from the end sentinel to the start sentinel is a control
//! signal, and iteration is implemented by resetting body nodes to pending.

use cascade_core::NodeKey;
use serde::{Deserialize, Serialize};

/// Default iteration cap when a loop does not specify one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// The body region and iteration settings of a single loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopContext {
    /// The loop controller node.
    pub loop_node: NodeKey,
    /// First node of the body (receives the `loop-body` edge).
    pub start_sentinel: NodeKey,
    /// Last node of the body (emits `continue_loop` and the exit edges).
    pub end_sentinel: NodeKey,
    /// Every node reset between iterations. Must contain both sentinels or
    /// have them as its boundary.
    pub body_nodes: Vec<NodeKey>,
    /// Workflow variable holding the current iteration index.
    pub iteration_variable: String,
    /// Hard cap on body executions.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Template resolving to the items array for foreach loops. `None` for
    /// condition-driven loops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterate_over: Option<String>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

impl LoopContext {
    /// Returns `true` if `node` belongs to this loop's body (sentinels
    /// included).
    #[must_use]
    pub fn contains(&self, node: &NodeKey) -> bool {
        node == &self.start_sentinel
            || node == &self.end_sentinel
            || self.body_nodes.contains(node)
    }

    /// The nodes reset when the loop re-enters its body: the body plus both
    /// sentinels, deduplicated.
    #[must_use]
    pub fn reset_set(&self) -> Vec<NodeKey> {
        let mut nodes = self.body_nodes.clone();
        for sentinel in [&self.start_sentinel, &self.end_sentinel] {
            if !nodes.contains(sentinel) {
                nodes.push(sentinel.clone());
            }
        }
        nodes
    }

    /// The variable holding the items array for foreach loops.
    #[must_use]
    pub fn items_variable(&self) -> String {
        format!("{}_items", self.iteration_variable)
    }

    /// The variable holding the current item for foreach loops.
    #[must_use]
    pub fn item_variable(&self) -> String {
        format!("{}_item", self.iteration_variable)
    }
}
