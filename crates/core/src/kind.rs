//! Design-level error taxonomy.
//!
//! These kinds classify terminal failures on the wire (the `failed` event
//! carries one); the per-crate error enums carry the detail.

use serde::{Deserialize, Serialize};

/// The kind of failure an execution (or subscriber) terminated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The workflow graph failed validation at build time.
    InvalidGraph,
    /// A node handler returned a failure.
    HandlerError,
    /// The scheduler found no executing and no ready nodes while work
    /// remained pending.
    Deadlock,
    /// The workflow-level time budget elapsed.
    Timeout,
    /// Cancellation was requested externally.
    Cancelled,
    /// A write to an event subscriber failed. Isolated to that subscriber,
    /// never fatal to the execution.
    SubscriberLost,
}

impl ErrorKind {
    /// Returns `true` for kinds that terminate the execution.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SubscriberLost)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGraph => write!(f, "invalid_graph"),
            Self::HandlerError => write!(f, "handler_error"),
            Self::Deadlock => write!(f, "deadlock"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::SubscriberLost => write!(f, "subscriber_lost"),
        }
    }
}
