//! The execution queue: readiness tracking, skip propagation, failure
//! cascade, and loop-iteration resets.
//!
//! The queue partitions every node into one [`NodeState`] bucket and owns
//! the edge-liveness table. It never dispatches anything — the scheduler
//! drains [`ExecutionQueue::ready_nodes`] and reports results back through
//! the `mark_*` operations, each of which returns the downstream effects
//! (promotions, cascaded skips, cascaded failures) it caused.
//!
//! A dependent is (re)evaluated only once **all** of its dependencies are
//! terminal and **all** of its incoming edges have decided liveness:
//!
//! - any live incoming edge            → promoted to ready
//! - otherwise, any failed dependency  → failed ("upstream failed")
//! - otherwise                         → skipped
//!
//! A loop-end completing with `continueLoop: true` deliberately decides
//! nothing: its outgoing edges stay undetermined until the final iteration,
//! so nodes past the loop cannot be skipped while the loop is still running.

use std::collections::HashMap;

use cascade_core::{HandleType, NodeKey};
use cascade_workflow::{BuiltWorkflow, EdgeDefinition, NodeState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A downstream state change caused by a `mark_*` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CascadeEffect {
    /// A dependent became ready.
    Promoted(NodeKey),
    /// A node was transitively skipped.
    Skipped(NodeKey),
    /// A node was transitively failed.
    Failed {
        /// The failed node.
        node: NodeKey,
        /// The synthetic upstream-failure message.
        error: String,
    },
}

/// Counts by bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    /// Nodes waiting on unsettled dependencies.
    pub pending: usize,
    /// Nodes ready to dispatch.
    pub ready: usize,
    /// Nodes currently executing (waits included).
    pub executing: usize,
    /// Nodes that completed successfully.
    pub completed: usize,
    /// Nodes that failed.
    pub failed: usize,
    /// Nodes skipped by branch selection or cascade.
    pub skipped: usize,
}

impl QueueSummary {
    /// Total nodes accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.ready + self.executing + self.completed + self.failed + self.skipped
    }
}

/// Per-execution node scheduling state. Serializable so checkpoint sinks
/// can persist it alongside the context snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionQueue {
    states: HashMap<NodeKey, NodeState>,
    edge_live: HashMap<String, bool>,
    errors: HashMap<NodeKey, String>,
}

impl ExecutionQueue {
    /// Initialize the queue: every node pending, the trigger ready.
    #[must_use]
    pub fn new(workflow: &BuiltWorkflow) -> Self {
        let mut states: HashMap<NodeKey, NodeState> = workflow
            .node_keys()
            .map(|key| (key.clone(), NodeState::Pending))
            .collect();
        states.insert(workflow.trigger.clone(), NodeState::Ready);
        Self {
            states,
            edge_live: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    /// A node's current state.
    #[must_use]
    pub fn state(&self, node: &NodeKey) -> Option<NodeState> {
        self.states.get(node).copied()
    }

    /// The recorded failure message for a node, if any.
    #[must_use]
    pub fn error(&self, node: &NodeKey) -> Option<&str> {
        self.errors.get(node).map(String::as_str)
    }

    /// Up to `cap` ready nodes in deterministic order: depth ascending,
    /// then key ascending.
    #[must_use]
    pub fn ready_nodes(&self, workflow: &BuiltWorkflow, cap: usize) -> Vec<NodeKey> {
        let mut ready: Vec<NodeKey> = self
            .states
            .iter()
            .filter(|(_, state)| **state == NodeState::Ready)
            .map(|(key, _)| key.clone())
            .collect();
        ready.sort_by(|a, b| {
            let depth_a = workflow.node(a).map_or(0, |n| n.depth);
            let depth_b = workflow.node(b).map_or(0, |n| n.depth);
            depth_a.cmp(&depth_b).then_with(|| a.cmp(b))
        });
        ready.truncate(cap);
        ready
    }

    /// Move the given nodes from ready to executing. Nodes not currently
    /// ready are left untouched.
    pub fn mark_executing(&mut self, nodes: &[NodeKey]) {
        for node in nodes {
            if self.states.get(node) == Some(&NodeState::Ready) {
                self.states.insert(node.clone(), NodeState::Executing);
            }
        }
    }

    /// Record a successful completion, decide outgoing edge liveness from
    /// `output`, and settle dependents.
    ///
    /// A loop-end reporting `continueLoop: true` completes without deciding
    /// anything downstream — the scheduler resets the body instead.
    pub fn mark_completed(
        &mut self,
        node: &NodeKey,
        output: &Map<String, Value>,
        workflow: &BuiltWorkflow,
    ) -> Vec<CascadeEffect> {
        self.states.insert(node.clone(), NodeState::Completed);
        self.errors.remove(node);

        if is_continuing_loop_end(workflow, node, output) {
            return Vec::new();
        }

        let Some(built) = workflow.node(node) else {
            return Vec::new();
        };
        for edge_id in &built.outgoing {
            let Some(edge) = workflow.edge(edge_id) else {
                continue;
            };
            if edge.is_loop_back() {
                continue;
            }
            self.edge_live
                .insert(edge_id.clone(), edge_is_live(edge, output));
        }

        let mut effects = Vec::new();
        for dependent in built.dependents.clone() {
            self.evaluate_node(&dependent, workflow, &mut effects);
        }
        effects
    }

    /// Record a failure and cascade it to every downstream node with no
    /// alternative live path.
    pub fn mark_failed(
        &mut self,
        node: &NodeKey,
        error: impl Into<String>,
        workflow: &BuiltWorkflow,
    ) -> Vec<CascadeEffect> {
        self.states.insert(node.clone(), NodeState::Failed);
        self.errors.insert(node.clone(), error.into());
        self.kill_outgoing_edges(node, workflow);

        let mut effects = Vec::new();
        if let Some(built) = workflow.node(node) {
            for dependent in built.dependents.clone() {
                self.evaluate_node(&dependent, workflow, &mut effects);
            }
        }
        effects
    }

    /// Record a skip and cascade it. A downstream node is transitively
    /// skipped only when every one of its incoming edges is dead and no
    /// dependency failed.
    pub fn mark_skipped(
        &mut self,
        node: &NodeKey,
        workflow: &BuiltWorkflow,
    ) -> Vec<CascadeEffect> {
        self.states.insert(node.clone(), NodeState::Skipped);
        self.kill_outgoing_edges(node, workflow);

        let mut effects = Vec::new();
        if let Some(built) = workflow.node(node) {
            for dependent in built.dependents.clone() {
                self.evaluate_node(&dependent, workflow, &mut effects);
            }
        }
        effects
    }

    /// Return a single node to pending for the next loop iteration.
    pub fn reset_node_for_iteration(&mut self, node: &NodeKey, workflow: &BuiltWorkflow) {
        self.reset_for_iteration(std::slice::from_ref(node), workflow);
    }

    /// Atomically return the given nodes from completed/skipped to pending,
    /// clear their decided edges, and recompute readiness for the new
    /// iteration.
    pub fn reset_for_iteration(&mut self, nodes: &[NodeKey], workflow: &BuiltWorkflow) {
        for node in nodes {
            match self.states.get(node) {
                Some(NodeState::Completed | NodeState::Skipped) => {
                    self.states.insert(node.clone(), NodeState::Pending);
                    self.errors.remove(node);
                }
                _ => continue,
            }
            if let Some(built) = workflow.node(node) {
                for edge_id in &built.outgoing {
                    self.edge_live.remove(edge_id);
                }
            }
        }
        let mut effects = Vec::new();
        for node in nodes {
            self.evaluate_node(node, workflow, &mut effects);
        }
        // Promotions here feed the next ready_nodes() call; skip/fail
        // cascades cannot happen from a reset (sources are undecided again).
    }

    /// `true` once nothing is pending, ready, or executing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.states.values().any(|state| {
            matches!(
                state,
                NodeState::Pending | NodeState::Ready | NodeState::Executing
            )
        })
    }

    /// `true` while any node is pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.states
            .values()
            .any(|state| *state == NodeState::Pending)
    }

    /// Number of currently executing nodes (waits included).
    #[must_use]
    pub fn executing_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| **state == NodeState::Executing)
            .count()
    }

    /// Counts by bucket.
    #[must_use]
    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary::default();
        for state in self.states.values() {
            match state {
                NodeState::Pending => summary.pending += 1,
                NodeState::Ready => summary.ready += 1,
                NodeState::Executing => summary.executing += 1,
                NodeState::Completed => summary.completed += 1,
                NodeState::Failed => summary.failed += 1,
                NodeState::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Settle `node` if its fate is decidable; recurse into dependents on
    /// skip/fail cascades.
    fn evaluate_node(
        &mut self,
        node: &NodeKey,
        workflow: &BuiltWorkflow,
        effects: &mut Vec<CascadeEffect>,
    ) {
        if self.states.get(node) != Some(&NodeState::Pending) {
            return;
        }
        let Some(built) = workflow.node(node) else {
            return;
        };
        if built.incoming.is_empty() {
            // Disconnected non-trigger node: stays pending; the scheduler's
            // deadlock detection surfaces it.
            return;
        }
        let deps_terminal = built.dependencies.iter().all(|dep| {
            self.states
                .get(dep)
                .is_some_and(|state| state.is_terminal())
        });
        if !deps_terminal {
            return;
        }
        let all_decided = built
            .incoming
            .iter()
            .all(|edge_id| self.edge_live.contains_key(edge_id));
        if !all_decided {
            return;
        }

        let has_live = built
            .incoming
            .iter()
            .any(|edge_id| self.edge_live.get(edge_id) == Some(&true));
        if has_live {
            self.states.insert(node.clone(), NodeState::Ready);
            effects.push(CascadeEffect::Promoted(node.clone()));
            return;
        }

        let failed_dep = built
            .dependencies
            .iter()
            .find(|dep| self.states.get(*dep) == Some(&NodeState::Failed))
            .cloned();
        let dependents = built.dependents.clone();
        if let Some(failed_dep) = failed_dep {
            let error = format!("upstream node {failed_dep} failed");
            self.states.insert(node.clone(), NodeState::Failed);
            self.errors.insert(node.clone(), error.clone());
            self.kill_outgoing_edges(node, workflow);
            effects.push(CascadeEffect::Failed {
                node: node.clone(),
                error,
            });
        } else {
            self.states.insert(node.clone(), NodeState::Skipped);
            self.kill_outgoing_edges(node, workflow);
            effects.push(CascadeEffect::Skipped(node.clone()));
        }
        for dependent in dependents {
            self.evaluate_node(&dependent, workflow, effects);
        }
    }

    /// Mark every outgoing non-loop-back edge of `node` dead.
    fn kill_outgoing_edges(&mut self, node: &NodeKey, workflow: &BuiltWorkflow) {
        let Some(built) = workflow.node(node) else {
            return;
        };
        for edge_id in &built.outgoing {
            if workflow.edge(edge_id).is_some_and(|e| !e.is_loop_back()) {
                self.edge_live.insert(edge_id.clone(), false);
            }
        }
    }
}

/// Whether `edge` is live given its source node's `output`.
fn edge_is_live(edge: &EdgeDefinition, output: &Map<String, Value>) -> bool {
    let selected = || output.get("selectedBranch").and_then(Value::as_str);
    match &edge.handle_type {
        HandleType::Default | HandleType::LoopBody => true,
        HandleType::LoopBack => false,
        // Exit edges go live only once the loop stops iterating.
        HandleType::LoopExit | HandleType::LoopComplete => {
            output.get("continueLoop").and_then(Value::as_bool) == Some(false)
        }
        HandleType::True => selected() == Some("true"),
        HandleType::False => selected() == Some("false"),
        HandleType::Custom(handle) => selected() == Some(handle.as_str()),
    }
}

/// A loop-end that wants another iteration: its completion decides nothing.
fn is_continuing_loop_end(
    workflow: &BuiltWorkflow,
    node: &NodeKey,
    output: &Map<String, Value>,
) -> bool {
    workflow.loop_ending_at(node).is_some()
        && output.get("continueLoop").and_then(Value::as_bool) == Some(true)
}
