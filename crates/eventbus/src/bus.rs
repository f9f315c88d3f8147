//! The partitioned event bus.
//!
//! One broadcast channel per execution. Emission snapshots the sender under
//! the lock, then sends outside it — a slow subscriber can lag its own
//! channel but never blocks the emitter or another execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use cascade_core::ExecutionId;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::event::ExecutionEvent;

/// Default per-execution channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Per-execution publish/subscribe hub.
///
/// Events for execution A never reach a subscriber of execution B; each
/// subscriber to the same execution receives every event independently.
/// Emitting to an execution nobody subscribed to is a silent no-op.
pub struct EventBus {
    channels: Mutex<HashMap<ExecutionId, broadcast::Sender<ExecutionEvent>>>,
    capacity: usize,
    emitted: AtomicU64,
}

impl EventBus {
    /// Create a bus with the given per-execution channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
            emitted: AtomicU64::new(0),
        }
    }

    /// Emit an event to the subscribers of its execution. Non-blocking;
    /// silently dropped when nobody is listening.
    pub fn emit(&self, event: ExecutionEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        let sender = {
            let channels = self.channels.lock();
            channels.get(&event.execution_id()).cloned()
        };
        if let Some(sender) = sender {
            // Send error just means all receivers are gone.
            let _ = sender.send(event);
        }
    }

    /// Subscribe to one execution's events. The subscription yields a
    /// `connected` event first, then every event emitted after this call.
    pub fn subscribe(&self, execution_id: ExecutionId) -> EventSubscription {
        let receiver = {
            let mut channels = self.channels.lock();
            channels
                .entry(execution_id)
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        EventSubscription {
            execution_id,
            receiver,
            connected_pending: true,
        }
    }

    /// Tear down an execution's channel once it is finished and flushed.
    /// Open subscriptions see end-of-stream after draining.
    pub fn drop_execution(&self, execution_id: ExecutionId) {
        self.channels.lock().remove(&execution_id);
    }

    /// Number of active subscribers for an execution.
    #[must_use]
    pub fn subscriber_count(&self, execution_id: ExecutionId) -> usize {
        self.channels
            .lock()
            .get(&execution_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Total events emitted since creation (dropped ones included).
    #[must_use]
    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("executions", &self.channels.lock().len())
            .field("total_emitted", &self.total_emitted())
            .finish()
    }
}

/// A live subscription to one execution's events.
pub struct EventSubscription {
    execution_id: ExecutionId,
    receiver: broadcast::Receiver<ExecutionEvent>,
    connected_pending: bool,
}

impl EventSubscription {
    /// The execution this subscription is bound to.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Receive the next event. The first call yields `connected`. Returns
    /// `None` once the channel is closed and drained. Lagged gaps are
    /// skipped — events are projections, losing some is acceptable.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        if self.connected_pending {
            self.connected_pending = false;
            return Some(ExecutionEvent::Connected {
                execution_id: self.execution_id,
            });
        }
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        execution_id = %self.execution_id,
                        missed,
                        "subscriber lagged, skipping events"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without blocking; `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        if self.connected_pending {
            self.connected_pending = false;
            return Some(ExecutionEvent::Connected {
                execution_id: self.execution_id,
            });
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}
