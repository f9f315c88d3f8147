//! Engine error types.

use cascade_workflow::NodeType;

/// Errors from the engine layer.
///
/// These surface only for setup problems. A workflow that runs and fails
/// still returns an [`ExecutionReport`](crate::ExecutionReport) — with
/// `status: Failed` — not an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The workflow failed validation or graph construction.
    #[error(transparent)]
    Workflow(#[from] cascade_workflow::WorkflowError),

    /// A node's type has no registered handler. Caught before any node
    /// runs.
    #[error("no handler registered for node type {node_type}")]
    HandlerMissing {
        /// The unhandled node type.
        node_type: NodeType,
    },

    /// Error from the execution state layer.
    #[error("execution error: {0}")]
    Execution(#[from] cascade_execution::ExecutionError),
}
