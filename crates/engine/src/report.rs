//! The result of one execution.

use std::time::Duration;

use cascade_core::{ErrorKind, ExecutionId, NodeKey, WorkflowId};
use cascade_execution::{ExecutionStatus, QueueSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// The failure classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The node at fault, when attributable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeKey>,
}

/// What one execution produced.
///
/// On failure, `final_outputs` is the partial merge over whichever output
/// nodes completed — possibly empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The execution identifier.
    pub execution_id: ExecutionId,
    /// The workflow executed.
    pub workflow_id: WorkflowId,
    /// The terminal status.
    pub status: ExecutionStatus,
    /// Merged outputs of the completed output nodes.
    pub final_outputs: Map<String, Value>,
    /// Node counts by bucket at termination.
    pub summary: QueueSummary,
    /// Wall-clock duration.
    #[serde(with = "serde_duration_ms")]
    pub duration: Duration,
    /// Failure details when `status` is not `Completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
}

impl ExecutionReport {
    /// `true` when the execution completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Serde helper for `Duration` serialized as integer milliseconds.
mod serde_duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(status: ExecutionStatus) -> ExecutionReport {
        ExecutionReport {
            execution_id: ExecutionId::v4(),
            workflow_id: WorkflowId::v4(),
            status,
            final_outputs: Map::new(),
            summary: QueueSummary::default(),
            duration: Duration::from_millis(1500),
            error: None,
        }
    }

    #[test]
    fn success_flag() {
        assert!(report(ExecutionStatus::Completed).is_success());
        assert!(!report(ExecutionStatus::Failed).is_success());
        assert!(!report(ExecutionStatus::Cancelled).is_success());
    }

    #[test]
    fn duration_serializes_as_millis() {
        let value = serde_json::to_value(report(ExecutionStatus::Completed)).unwrap();
        assert_eq!(value["duration"], json!(1500));
    }

    #[test]
    fn serde_roundtrip_with_failure() {
        let mut r = report(ExecutionStatus::Failed);
        r.error = Some(ExecutionFailure {
            kind: ErrorKind::Deadlock,
            message: "no ready nodes".into(),
            node: None,
        });
        let json = serde_json::to_string(&r).unwrap();
        let back: ExecutionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, ExecutionStatus::Failed);
        assert_eq!(back.error.unwrap().kind, ErrorKind::Deadlock);
        assert_eq!(back.duration, Duration::from_millis(1500));
    }
}
