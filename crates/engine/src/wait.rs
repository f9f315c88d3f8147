//! The wait & signal coordinator.
//!
//! Wait nodes park here: the handler registers a pending wait keyed by
//! `(execution, node)` and awaits its receiver; external callers resolve it
//! through [`WaitCoordinator::deliver`]. Exactly one resolution wins —
//! signal, timeout, or cancellation — and later deliveries report
//! `already-resolved`.

use std::collections::{HashMap, HashSet};

use cascade_core::{ExecutionId, NodeKey};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

/// Outcome of a signal delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SignalDelivery {
    /// The wait existed and this payload resolved it.
    Delivered,
    /// No wait is pending under that key.
    NotFound,
    /// The wait was already resolved (by an earlier signal, a timeout, or
    /// cancellation). First delivery wins.
    AlreadyResolved,
}

impl SignalDelivery {
    /// `true` when this attempt resolved the wait.
    #[must_use]
    pub fn delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// A wait registration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// A wait is already pending under this key.
    #[error("wait already pending for {execution_id}:{node}")]
    AlreadyPending {
        /// The execution.
        execution_id: ExecutionId,
        /// The waiting node.
        node: NodeKey,
    },
}

type WaitKey = (ExecutionId, NodeKey);

/// The pending-wait table: one lazily-created slot per `execution:node`,
/// pruned as waits resolve or executions end.
#[derive(Default)]
pub struct WaitCoordinator {
    pending: Mutex<PendingTable>,
}

#[derive(Default)]
struct PendingTable {
    waiting: HashMap<WaitKey, oneshot::Sender<Map<String, Value>>>,
    resolved: HashSet<WaitKey>,
}

impl WaitCoordinator {
    /// An empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending wait. The returned receiver resolves with the
    /// delivered payload.
    pub fn register(
        &self,
        execution_id: ExecutionId,
        node: NodeKey,
    ) -> Result<oneshot::Receiver<Map<String, Value>>, WaitError> {
        let mut table = self.pending.lock();
        let key = (execution_id, node.clone());
        if table.waiting.contains_key(&key) {
            return Err(WaitError::AlreadyPending { execution_id, node });
        }
        table.resolved.remove(&key); // a re-registered wait (loop iteration) starts fresh
        let (tx, rx) = oneshot::channel();
        table.waiting.insert(key, tx);
        Ok(rx)
    }

    /// Deliver a signal payload to a pending wait. First delivery wins.
    pub fn deliver(
        &self,
        execution_id: ExecutionId,
        node: &NodeKey,
        payload: Map<String, Value>,
    ) -> SignalDelivery {
        let mut table = self.pending.lock();
        let key = (execution_id, node.clone());
        if let Some(tx) = table.waiting.remove(&key) {
            table.resolved.insert(key);
            // The receiver dropping concurrently is indistinguishable from
            // resolution for the caller.
            let _ = tx.send(payload);
            return SignalDelivery::Delivered;
        }
        if table.resolved.contains(&key) {
            SignalDelivery::AlreadyResolved
        } else {
            SignalDelivery::NotFound
        }
    }

    /// Resolve a wait locally (timeout or cancellation inside the handler):
    /// drops the sender and records the key as resolved so late signals get
    /// `already-resolved`.
    pub fn resolve_local(&self, execution_id: ExecutionId, node: &NodeKey) {
        let mut table = self.pending.lock();
        let key = (execution_id, node.clone());
        table.waiting.remove(&key);
        table.resolved.insert(key);
    }

    /// `true` while a wait is pending under the key.
    #[must_use]
    pub fn is_pending(&self, execution_id: ExecutionId, node: &NodeKey) -> bool {
        self.pending
            .lock()
            .waiting
            .contains_key(&(execution_id, node.clone()))
    }

    /// Number of pending waits for an execution.
    #[must_use]
    pub fn pending_count(&self, execution_id: ExecutionId) -> usize {
        self.pending
            .lock()
            .waiting
            .keys()
            .filter(|(id, _)| *id == execution_id)
            .count()
    }

    /// Every pending wait key, for admin surfaces and signal routing.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<(ExecutionId, NodeKey)> {
        self.pending.lock().waiting.keys().cloned().collect()
    }

    /// Drop every entry for a finished execution.
    pub fn remove_execution(&self, execution_id: ExecutionId) {
        let mut table = self.pending.lock();
        table.waiting.retain(|(id, _), _| *id != execution_id);
        table.resolved.retain(|(id, _)| *id != execution_id);
    }
}

impl std::fmt::Debug for WaitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.pending.lock();
        f.debug_struct("WaitCoordinator")
            .field("waiting", &table.waiting.len())
            .field("resolved", &table.resolved.len())
            .finish()
    }
}
