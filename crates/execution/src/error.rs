//! Execution-layer error types.

/// Errors from execution state tracking.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// An invalid execution status transition was attempted.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// The status transitioned from.
        from: String,
        /// The status transitioned to.
        to: String,
    },

    /// A queue operation referenced a node the workflow does not contain.
    #[error("unknown node: {node}")]
    UnknownNode {
        /// The missing node key.
        node: String,
    },
}
