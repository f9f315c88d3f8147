#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Workflow
//!
//! Workflow definition, DAG graph model, and validation for the Cascade
//! workflow engine. This crate models the *shape* of a workflow — it knows
//! nothing about execution:
//!
//! - [`WorkflowDefinition`] — the raw, serde-friendly authoring format
//! - [`NodeDefinition`] / [`EdgeDefinition`] / [`LoopContext`] — its parts
//! - [`WorkflowBuilder`] — validation and graph construction
//! - [`BuiltWorkflow`] — the immutable, adjacency-indexed graph the
//!   scheduler runs against (depths, execution levels, loop membership)
//! - [`NodeState`] — per-node lifecycle states with validated transitions

pub mod definition;
pub mod edge;
pub mod error;
pub mod graph;
pub mod loops;
pub mod node;
pub mod state;

pub use definition::{WorkflowConfig, WorkflowDefinition};
pub use edge::EdgeDefinition;
pub use error::WorkflowError;
pub use graph::{BuiltNode, BuiltWorkflow, WorkflowBuilder};
pub use loops::LoopContext;
pub use node::{ErrorPolicy, NodeDefinition, NodeType};
pub use state::NodeState;
