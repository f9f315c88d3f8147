//! Workflow-layer error types.

/// Errors from workflow validation and graph construction.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The definition failed structural validation.
    #[error("invalid graph: {reason}")]
    InvalidGraph {
        /// What the validator rejected.
        reason: String,
    },

    /// An invalid node state transition was attempted.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// The state transitioned from.
        from: String,
        /// The state transitioned to.
        to: String,
    },
}

impl WorkflowError {
    /// Shorthand for an [`WorkflowError::InvalidGraph`] with a formatted reason.
    pub fn invalid_graph(reason: impl Into<String>) -> Self {
        Self::InvalidGraph {
            reason: reason.into(),
        }
    }
}
