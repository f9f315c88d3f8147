//! Immutable context snapshots.
//!
//! A snapshot is a value: "mutation" produces a new snapshot and never
//! touches the original. Entries are `Arc`-shared between versions, so a
//! write clones two map spines and bumps reference counts — cheap enough
//! given snapshots churn only on node completion.

use std::collections::HashMap;
use std::sync::Arc;

use cascade_core::NodeKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bookkeeping carried along with every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Cumulative bytes written over the life of the execution. A write
    /// counter, not the in-memory size: loop iterations that overwrite a
    /// node's output still add to it.
    pub total_bytes: u64,
    /// Number of nodes with an output in this snapshot.
    pub node_count: usize,
    /// When the root snapshot was created.
    pub created_at: DateTime<Utc>,
}

/// An immutable view of everything an execution has produced so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    node_outputs: HashMap<NodeKey, Arc<Map<String, Value>>>,
    variables: HashMap<String, Arc<Value>>,
    inputs: Arc<Map<String, Value>>,
    metadata: SnapshotMetadata,
}

impl ContextSnapshot {
    /// Create the root snapshot for an execution.
    #[must_use]
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            node_outputs: HashMap::new(),
            variables: HashMap::new(),
            inputs: Arc::new(inputs),
            metadata: SnapshotMetadata {
                total_bytes: 0,
                node_count: 0,
                created_at: Utc::now(),
            },
        }
    }

    /// A new snapshot with `output` recorded for `node`. Overwriting an
    /// existing entry is allowed — loop iterations rely on it.
    #[must_use]
    pub fn with_node_output(&self, node: NodeKey, output: Map<String, Value>) -> Self {
        let mut next = self.clone();
        next.metadata.total_bytes += approximate_size(&Value::Object(output.clone()));
        next.node_outputs.insert(node, Arc::new(output));
        next.metadata.node_count = next.node_outputs.len();
        next
    }

    /// A new snapshot with the variable set.
    #[must_use]
    pub fn with_variable(&self, name: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.metadata.total_bytes += approximate_size(&value);
        next.variables.insert(name.into(), Arc::new(value));
        next
    }

    /// A node's output, if recorded.
    #[must_use]
    pub fn node_output(&self, node: &NodeKey) -> Option<&Map<String, Value>> {
        self.node_outputs.get(node).map(|output| output.as_ref())
    }

    /// The shared handle for a node's output. Lets callers check structural
    /// sharing across snapshot versions.
    #[must_use]
    pub fn node_output_shared(&self, node: &NodeKey) -> Option<Arc<Map<String, Value>>> {
        self.node_outputs.get(node).cloned()
    }

    /// A workflow variable, if set.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).map(|value| value.as_ref())
    }

    /// The execution inputs.
    #[must_use]
    pub fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    /// Iterate over recorded node outputs (unordered).
    pub fn node_outputs(&self) -> impl Iterator<Item = (&NodeKey, &Map<String, Value>)> {
        self.node_outputs.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// The snapshot's bookkeeping.
    #[must_use]
    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    /// The flat object interpolation binds against: node outputs, then
    /// inputs, then variables — later sources win on key collision, so
    /// variables shadow inputs shadow outputs. A node-key-prefixed path
    /// (`{{NodeA.field}}`) is unambiguous.
    #[must_use]
    pub fn execution_context(&self) -> Value {
        let mut flat = Map::new();
        for (node, output) in &self.node_outputs {
            flat.insert(node.to_string(), Value::Object((**output).clone()));
        }
        for (key, value) in self.inputs.iter() {
            flat.insert(key.clone(), value.clone());
        }
        for (key, value) in &self.variables {
            flat.insert(key.clone(), (**value).clone());
        }
        Value::Object(flat)
    }

    /// Merge the outputs of the given nodes left-to-right (later wins on
    /// key collision). Nodes without an output contribute nothing.
    #[must_use]
    pub fn final_outputs(&self, output_nodes: &[NodeKey]) -> Map<String, Value> {
        let mut merged = Map::new();
        for node in output_nodes {
            if let Some(output) = self.node_output(node) {
                for (key, value) in output {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }
}

/// Advisory size estimate: the serialized length of the value.
fn approximate_size(value: &Value) -> u64 {
    serde_json::to_string(value).map_or(0, |s| s.len() as u64)
}
