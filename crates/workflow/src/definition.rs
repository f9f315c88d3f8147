//! The raw, serde-friendly workflow authoring format.

use cascade_core::{NodeKey, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::edge::EdgeDefinition;
use crate::loops::LoopContext;
use crate::node::NodeDefinition;

/// Default soft cap on in-flight nodes within one execution.
pub const DEFAULT_MAX_CONCURRENT_NODES: usize = 8;

/// Execution-affecting workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Soft cap on in-flight nodes within one execution.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_nodes: usize,
    /// Wall-clock budget for the whole execution, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_NODES
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: DEFAULT_MAX_CONCURRENT_NODES,
            timeout_ms: None,
        }
    }
}

/// A complete workflow in the authoring format.
///
/// This is what users write (and what persists). It is validated and
/// compiled into a [`BuiltWorkflow`](crate::BuiltWorkflow) before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    #[serde(default = "WorkflowId::v4")]
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// All nodes.
    pub nodes: Vec<NodeDefinition>,
    /// All edges.
    pub edges: Vec<EdgeDefinition>,
    /// The trigger node executions start from.
    pub entry_point: NodeKey,
    /// Loop body regions, keyed by their controller in the built form.
    #[serde(default)]
    pub loops: Vec<LoopContext>,
    /// Initial workflow variables.
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Execution settings.
    #[serde(default)]
    pub config: WorkflowConfig,
    /// When the definition was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When the definition was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an empty definition with the given name and entry point.
    pub fn new(name: impl Into<String>, entry_point: NodeKey) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            entry_point,
            loops: Vec::new(),
            variables: serde_json::Map::new(),
            config: WorkflowConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a node.
    #[must_use]
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: EdgeDefinition) -> Self {
        self.edges.push(edge);
        self
    }

    /// Append a loop context.
    #[must_use]
    pub fn with_loop(mut self, ctx: LoopContext) -> Self {
        self.loops.push(ctx);
        self
    }
}
