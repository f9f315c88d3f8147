//! Graph construction and validation.
//!
//! [`WorkflowBuilder`] turns a raw [`WorkflowDefinition`] into a
//! [`BuiltWorkflow`]: an immutable, adjacency-indexed view with per-node
//! depths and a topological layering. All structural validation happens
//! here; the scheduler trusts the built graph completely.
//!
//! Loop-back edges are control signals, not data edges. They are excluded
//! from dependencies, cycle detection, and depth computation, which keeps
//! the graph a DAG even though loops visually close a cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use cascade_core::{NodeKey, WorkflowId};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::definition::WorkflowDefinition;
use crate::edge::EdgeDefinition;
use crate::error::WorkflowError;
use crate::loops::LoopContext;
use crate::node::{NodeDefinition, NodeType};

/// A node inside a built workflow, with its adjacency precomputed.
#[derive(Debug, Clone)]
pub struct BuiltNode {
    /// The underlying definition.
    pub definition: NodeDefinition,
    /// Longest-path distance from the trigger. Used as a scheduling
    /// priority bound only.
    pub depth: usize,
    /// Sources of incoming non-loop-back edges.
    pub dependencies: Vec<NodeKey>,
    /// Targets of outgoing non-loop-back edges.
    pub dependents: Vec<NodeKey>,
    /// Ids of incoming non-loop-back edges.
    pub incoming: Vec<String>,
    /// Ids of all outgoing edges, loop-back included.
    pub outgoing: Vec<String>,
}

impl BuiltNode {
    /// The node's key.
    #[must_use]
    pub fn key(&self) -> &NodeKey {
        &self.definition.id
    }

    /// The node's type tag.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.definition.node_type
    }
}

/// An immutable, validated workflow graph.
#[derive(Debug, Clone)]
pub struct BuiltWorkflow {
    /// Workflow identifier.
    pub id: WorkflowId,
    /// Workflow name.
    pub name: String,
    nodes: HashMap<NodeKey, BuiltNode>,
    edges: HashMap<String, EdgeDefinition>,
    /// The node executions start from.
    pub trigger: NodeKey,
    /// All output-typed nodes, in definition order.
    pub output_nodes: Vec<NodeKey>,
    /// Topological layering by depth. Diagnostic; the queue derives
    /// readiness from dependencies, not levels.
    pub execution_levels: Vec<Vec<NodeKey>>,
    loop_contexts: HashMap<NodeKey, LoopContext>,
    /// Soft cap on in-flight nodes.
    pub max_concurrent_nodes: usize,
    /// Wall-clock budget in milliseconds, if configured.
    pub timeout_ms: Option<u64>,
    /// Initial workflow variables.
    pub variables: serde_json::Map<String, serde_json::Value>,
}

impl BuiltWorkflow {
    /// Validate and build a workflow graph from its definition.
    pub fn build(definition: WorkflowDefinition) -> Result<Self, WorkflowError> {
        WorkflowBuilder::new(definition).build()
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, key: &NodeKey) -> Option<&BuiltNode> {
        self.nodes.get(key)
    }

    /// Look up an edge by id.
    #[must_use]
    pub fn edge(&self, id: &str) -> Option<&EdgeDefinition> {
        self.edges.get(id)
    }

    /// Iterate over all nodes (unordered).
    pub fn nodes(&self) -> impl Iterator<Item = &BuiltNode> {
        self.nodes.values()
    }

    /// Iterate over all node keys (unordered).
    pub fn node_keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The loop context controlled by `loop_node`, if any.
    #[must_use]
    pub fn loop_context(&self, loop_node: &NodeKey) -> Option<&LoopContext> {
        self.loop_contexts.get(loop_node)
    }

    /// The loop context whose end sentinel is `node`, if any.
    #[must_use]
    pub fn loop_ending_at(&self, node: &NodeKey) -> Option<&LoopContext> {
        self.loop_contexts.values().find(|c| &c.end_sentinel == node)
    }

    /// The innermost loop whose body contains `node`, if any. Nested loops
    /// resolve to the smallest enclosing body.
    #[must_use]
    pub fn loop_containing(&self, node: &NodeKey) -> Option<&LoopContext> {
        self.loop_contexts
            .values()
            .filter(|c| c.contains(node))
            .min_by_key(|c| c.body_nodes.len())
    }

    /// Iterate over all loop contexts (unordered).
    pub fn loop_contexts(&self) -> impl Iterator<Item = &LoopContext> {
        self.loop_contexts.values()
    }
}

/// Validates a [`WorkflowDefinition`] and assembles the [`BuiltWorkflow`].
#[derive(Debug)]
pub struct WorkflowBuilder {
    definition: WorkflowDefinition,
}

impl WorkflowBuilder {
    /// Wrap a definition for building.
    #[must_use]
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self { definition }
    }

    /// Run all validation and produce the built graph.
    pub fn build(self) -> Result<BuiltWorkflow, WorkflowError> {
        let def = self.definition;

        if def.nodes.is_empty() {
            return Err(WorkflowError::invalid_graph("workflow has no nodes"));
        }

        // (a) unique node ids
        let mut nodes: HashMap<NodeKey, BuiltNode> = HashMap::with_capacity(def.nodes.len());
        for node in def.nodes {
            let key = node.id.clone();
            let built = BuiltNode {
                definition: node,
                depth: 0,
                dependencies: Vec::new(),
                dependents: Vec::new(),
                incoming: Vec::new(),
                outgoing: Vec::new(),
            };
            if nodes.insert(key.clone(), built).is_some() {
                return Err(WorkflowError::invalid_graph(format!(
                    "duplicate node id: {key}"
                )));
            }
        }

        // (b) edge endpoints exist; derive missing ids, reject duplicates
        let mut edges: HashMap<String, EdgeDefinition> = HashMap::with_capacity(def.edges.len());
        for mut edge in def.edges {
            if !nodes.contains_key(&edge.source) {
                return Err(WorkflowError::invalid_graph(format!(
                    "edge references unknown source node: {}",
                    edge.source
                )));
            }
            if !nodes.contains_key(&edge.target) {
                return Err(WorkflowError::invalid_graph(format!(
                    "edge references unknown target node: {}",
                    edge.target
                )));
            }
            if edge.id.is_empty() {
                edge.id = format!(
                    "{}:{}:{}",
                    edge.source,
                    edge.handle_type.as_str(),
                    edge.target
                );
            }
            let id = edge.id.clone();
            if edges.insert(id.clone(), edge).is_some() {
                return Err(WorkflowError::invalid_graph(format!(
                    "duplicate edge id: {id}"
                )));
            }
        }

        // Adjacency. Loop-back edges appear only in `outgoing` — they are
        // control signals, never data dependencies.
        let mut edge_ids: Vec<&String> = edges.keys().collect();
        edge_ids.sort();
        for id in edge_ids {
            let edge = &edges[id.as_str()];
            let (source, target) = (edge.source.clone(), edge.target.clone());
            if let Some(node) = nodes.get_mut(&source) {
                node.outgoing.push(id.clone());
            }
            if edge.is_loop_back() {
                continue;
            }
            if let Some(node) = nodes.get_mut(&source) {
                node.dependents.push(target.clone());
            }
            if let Some(node) = nodes.get_mut(&target) {
                node.dependencies.push(source);
                node.incoming.push(id.clone());
            }
        }

        // (d) entry point exists and has no incoming data edges
        let trigger = def.entry_point;
        let Some(entry) = nodes.get(&trigger) else {
            return Err(WorkflowError::invalid_graph(format!(
                "entry point references unknown node: {trigger}"
            )));
        };
        if !entry.incoming.is_empty() {
            return Err(WorkflowError::invalid_graph(format!(
                "entry point {trigger} has incoming edges"
            )));
        }

        // (c) acyclic once loop-back edges are removed. Loops are the only
        // sanctioned cycles and they close through loop-back edges.
        let mut indices: HashMap<NodeKey, NodeIndex> = HashMap::with_capacity(nodes.len());
        let mut petgraph: DiGraph<NodeKey, ()> = DiGraph::new();
        let mut keys: Vec<&NodeKey> = nodes.keys().collect();
        keys.sort();
        for key in keys {
            let idx = petgraph.add_node(key.clone());
            indices.insert(key.clone(), idx);
        }
        for edge in edges.values() {
            if edge.is_loop_back() {
                continue;
            }
            petgraph.add_edge(indices[&edge.source], indices[&edge.target], ());
        }
        let topo_order = toposort(&petgraph, None).map_err(|cycle| {
            WorkflowError::invalid_graph(format!(
                "cycle outside a loop body, through node {}",
                petgraph[cycle.node_id()]
            ))
        })?;

        // Depth = longest path from the trigger, over the topological order.
        let mut depths: HashMap<NodeKey, usize> = HashMap::with_capacity(nodes.len());
        depths.insert(trigger.clone(), 0);
        for idx in &topo_order {
            let key = &petgraph[*idx];
            let Some(depth) = depths.get(key).copied() else {
                continue; // unreachable from the trigger
            };
            for dependent in &nodes[key].dependents {
                let entry = depths.entry(dependent.clone()).or_insert(0);
                *entry = (*entry).max(depth + 1);
            }
        }
        for (key, node) in &mut nodes {
            node.depth = depths.get(key).copied().unwrap_or(0);
        }

        // (e) every output node reachable from the entry
        let reachable: HashSet<&NodeKey> = {
            let mut seen = HashSet::new();
            let mut frontier = VecDeque::from([&trigger]);
            while let Some(key) = frontier.pop_front() {
                if !seen.insert(key) {
                    continue;
                }
                for dependent in &nodes[key].dependents {
                    frontier.push_back(dependent);
                }
            }
            seen
        };
        let mut output_nodes: Vec<NodeKey> = Vec::new();
        let mut node_keys_sorted: Vec<NodeKey> = nodes.keys().cloned().collect();
        node_keys_sorted.sort();
        for key in &node_keys_sorted {
            if nodes[key].node_type() == NodeType::Output {
                if !reachable.contains(key) {
                    return Err(WorkflowError::invalid_graph(format!(
                        "output node {key} is unreachable from the entry point"
                    )));
                }
                output_nodes.push(key.clone());
            }
        }

        // Loop contexts: members exist, body is path-closed between sentinels.
        let mut loop_contexts: HashMap<NodeKey, LoopContext> = HashMap::new();
        for ctx in def.loops {
            for member in [&ctx.loop_node, &ctx.start_sentinel, &ctx.end_sentinel]
                .into_iter()
                .chain(ctx.body_nodes.iter())
            {
                if !nodes.contains_key(member) {
                    return Err(WorkflowError::invalid_graph(format!(
                        "loop {} references unknown node: {member}",
                        ctx.loop_node
                    )));
                }
            }
            validate_loop_body(&ctx, &nodes)?;
            let loop_node = ctx.loop_node.clone();
            if loop_contexts.insert(loop_node.clone(), ctx).is_some() {
                return Err(WorkflowError::invalid_graph(format!(
                    "duplicate loop context for node: {loop_node}"
                )));
            }
        }

        // Topological layering by depth, reachable nodes only.
        let max_depth = reachable
            .iter()
            .map(|k| nodes[*k].depth)
            .max()
            .unwrap_or(0);
        let mut execution_levels: Vec<Vec<NodeKey>> = vec![Vec::new(); max_depth + 1];
        for key in &node_keys_sorted {
            if reachable.contains(key) {
                execution_levels[nodes[key].depth].push(key.clone());
            }
        }

        Ok(BuiltWorkflow {
            id: def.id,
            name: def.name,
            nodes,
            edges,
            trigger,
            output_nodes,
            execution_levels,
            loop_contexts,
            max_concurrent_nodes: def.config.max_concurrent_nodes,
            timeout_ms: def.config.timeout_ms,
            variables: def.variables,
        })
    }
}

/// Every path from the start sentinel must stay inside the body until it
/// reaches the end sentinel.
fn validate_loop_body(
    ctx: &LoopContext,
    nodes: &HashMap<NodeKey, BuiltNode>,
) -> Result<(), WorkflowError> {
    let mut seen: HashSet<&NodeKey> = HashSet::new();
    let mut frontier = VecDeque::from([&ctx.start_sentinel]);
    while let Some(key) = frontier.pop_front() {
        if !seen.insert(key) {
            continue;
        }
        if key == &ctx.end_sentinel {
            continue; // paths stop at the end sentinel
        }
        if !ctx.contains(key) {
            return Err(WorkflowError::invalid_graph(format!(
                "loop {} body is not closed: path escapes through {key}",
                ctx.loop_node
            )));
        }
        for dependent in &nodes[key].dependents {
            frontier.push_back(dependent);
        }
    }
    if !seen.contains(&ctx.end_sentinel) {
        return Err(WorkflowError::invalid_graph(format!(
            "loop {} end sentinel {} is unreachable from its start sentinel",
            ctx.loop_node, ctx.end_sentinel
        )));
    }
    Ok(())
}
