//! Execution-level lifecycle.

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// Where a whole execution sits in its lifecycle.
///
/// The scheduler owns every move between these states. Two of them carry
/// Cascade-specific meaning:
///
/// - `Paused`: the execution is alive but every in-flight node is a wait
///   pending an external signal, a timer, or cancellation — nothing is
///   ready and nothing is computing.
/// - `Cancelling`: the drain phase. A cancel request (or the workflow
///   timeout, which takes the same path) stops dispatch immediately, but
///   in-flight handlers are allowed to finish; the terminal state the
///   drain lands in records why it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Built but not yet handed to a scheduler.
    Created,
    /// Nodes are being dispatched and settled.
    Running,
    /// Only wait nodes remain in flight.
    Paused,
    /// Dispatch has stopped; in-flight handlers are draining.
    Cancelling,
    /// Terminal: every reachable node settled and the outputs completed.
    Completed,
    /// Terminal: a node failure (or deadlock) ended the execution.
    Failed,
    /// Terminal: an external cancel request was fully processed.
    Cancelled,
    /// Terminal: the workflow's wall-clock budget elapsed.
    TimedOut,
}

impl ExecutionStatus {
    /// The statuses this one may move to next.
    ///
    /// This is the scheduler's behavior written down, not a free-form
    /// table: `Created` can only start; `Running` and `Paused` trade
    /// places as waits block and resolve; every cancel or timeout passes
    /// through the `Cancelling` drain, which ends in `Cancelled`,
    /// `TimedOut`, or `Failed` depending on what started it; terminal
    /// states go nowhere.
    #[must_use]
    pub fn successors(&self) -> &'static [Self] {
        match self {
            Self::Created => &[Self::Running],
            Self::Running => &[
                Self::Paused,
                Self::Cancelling,
                Self::Completed,
                Self::Failed,
            ],
            Self::Paused => &[Self::Running, Self::Cancelling],
            Self::Cancelling => &[Self::Cancelled, Self::TimedOut, Self::Failed],
            Self::Completed | Self::Failed | Self::Cancelled | Self::TimedOut => &[],
        }
    }

    /// Returns `true` if `next` is a legal move from this status.
    #[must_use]
    pub fn can_become(&self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Move to `next`, validating the edge.
    pub fn transition_to(&mut self, next: Self) -> Result<(), ExecutionError> {
        if self.can_become(next) {
            *self = next;
            Ok(())
        } else {
            Err(ExecutionError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Terminal statuses have nowhere left to go.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Returns `true` while the scheduler still holds the execution
    /// (dispatching, parked on waits, or draining).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Cancelling)
    }

    /// Returns `true` only for the successful terminal status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// The wire form (matches the serde rename).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL: [ExecutionStatus; 8] = [
        ExecutionStatus::Created,
        ExecutionStatus::Running,
        ExecutionStatus::Paused,
        ExecutionStatus::Cancelling,
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
        ExecutionStatus::TimedOut,
    ];

    #[test]
    fn created_can_only_start() {
        assert_eq!(ExecutionStatus::Created.successors(), &[ExecutionStatus::Running]);
    }

    #[test]
    fn waits_trade_running_and_paused() {
        assert!(ExecutionStatus::Running.can_become(ExecutionStatus::Paused));
        assert!(ExecutionStatus::Paused.can_become(ExecutionStatus::Running));
    }

    #[test]
    fn timeout_drains_through_cancelling() {
        // A timeout is a cancellation with a different terminal label: it
        // never jumps straight from Running to TimedOut.
        assert!(!ExecutionStatus::Running.can_become(ExecutionStatus::TimedOut));
        assert!(ExecutionStatus::Running.can_become(ExecutionStatus::Cancelling));
        assert!(ExecutionStatus::Cancelling.can_become(ExecutionStatus::TimedOut));
    }

    #[test]
    fn drain_records_why_it_started() {
        let drain = ExecutionStatus::Cancelling.successors();
        assert!(drain.contains(&ExecutionStatus::Cancelled));
        assert!(drain.contains(&ExecutionStatus::TimedOut));
        assert!(drain.contains(&ExecutionStatus::Failed));
        assert!(!drain.contains(&ExecutionStatus::Completed));
    }

    #[test]
    fn paused_cannot_finish_without_resuming() {
        assert!(!ExecutionStatus::Paused.can_become(ExecutionStatus::Completed));
        assert!(!ExecutionStatus::Paused.can_become(ExecutionStatus::Failed));
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        for status in ALL {
            assert_eq!(status.is_terminal(), status.successors().is_empty());
        }
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(ExecutionStatus::TimedOut.is_terminal());
        assert!(!ExecutionStatus::Cancelling.is_terminal());
    }

    #[test]
    fn active_covers_dispatching_parked_and_draining() {
        assert!(ExecutionStatus::Running.is_active());
        assert!(ExecutionStatus::Paused.is_active());
        assert!(ExecutionStatus::Cancelling.is_active());
        assert!(!ExecutionStatus::Created.is_active());
        assert!(!ExecutionStatus::Completed.is_active());
    }

    #[test]
    fn only_completed_is_success() {
        for status in ALL {
            assert_eq!(status.is_success(), status == ExecutionStatus::Completed);
        }
    }

    #[test]
    fn transition_to_moves_on_legal_edges() {
        let mut status = ExecutionStatus::Created;
        status.transition_to(ExecutionStatus::Running).unwrap();
        status.transition_to(ExecutionStatus::Cancelling).unwrap();
        status.transition_to(ExecutionStatus::TimedOut).unwrap();
        assert_eq!(status, ExecutionStatus::TimedOut);
    }

    #[test]
    fn transition_to_rejects_and_leaves_status_unchanged() {
        let mut status = ExecutionStatus::Completed;
        let err = status.transition_to(ExecutionStatus::Running).unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
        assert_eq!(status, ExecutionStatus::Completed);
    }

    #[test]
    fn no_edge_leaves_a_terminal_status() {
        for from in ALL.into_iter().filter(ExecutionStatus::is_terminal) {
            for to in ALL {
                assert!(!from.can_become(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(ExecutionStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(ExecutionStatus::Cancelling.to_string(), "cancelling");
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
        }
    }

    #[test]
    fn serde_roundtrip() {
        for status in ALL {
            let json = serde_json::to_string(&status).unwrap();
            let back: ExecutionStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, back);
        }
    }
}
