//! Per-execution engine options.

use std::sync::Arc;
use std::time::Duration;

use cascade_core::ExecutionId;
use cascade_execution::{ContextSnapshot, ExecutionQueue};

/// Persistence hook invoked after every node settles (completed, failed,
/// or skipped). The sink receives the full queue state — per-node buckets
/// and decided edge liveness — so an external layer can reconstruct the
/// execution; recovery itself is that layer's concern, the engine only
/// calls out.
pub trait CheckpointSink: Send + Sync {
    /// Persist one checkpoint.
    fn save(&self, execution_id: ExecutionId, snapshot: &ContextSnapshot, queue: &ExecutionQueue);
}

/// Tunables for one execution.
#[derive(Clone)]
pub struct EngineOptions {
    /// Override the workflow's in-flight node cap.
    pub max_concurrent_nodes: Option<usize>,
    /// Wall-clock budget; elapsing it cancels the execution with a
    /// `timeout` failure.
    pub workflow_timeout: Option<Duration>,
    /// Keepalive comment cadence on SSE subscribers.
    pub keep_alive_interval: Duration,
    /// Grace period between a terminal event and subscriber close.
    pub terminal_flush_delay: Duration,
    /// Checkpoint sink, if the caller wants one.
    pub checkpoint: Option<Arc<dyn CheckpointSink>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: None,
            workflow_timeout: None,
            keep_alive_interval: Duration::from_secs(30),
            terminal_flush_delay: Duration::from_millis(500),
            checkpoint: None,
        }
    }
}

impl EngineOptions {
    /// Set the in-flight node cap.
    #[must_use]
    pub fn with_max_concurrent_nodes(mut self, cap: usize) -> Self {
        self.max_concurrent_nodes = Some(cap);
        self
    }

    /// Set the workflow timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.workflow_timeout = Some(timeout);
        self
    }

    /// Set the keepalive cadence.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Set the terminal flush delay.
    #[must_use]
    pub fn with_terminal_flush_delay(mut self, delay: Duration) -> Self {
        self.terminal_flush_delay = delay;
        self
    }

    /// Attach a checkpoint sink.
    #[must_use]
    pub fn with_checkpoint(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.checkpoint = Some(sink);
        self
    }
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("max_concurrent_nodes", &self.max_concurrent_nodes)
            .field("workflow_timeout", &self.workflow_timeout)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("terminal_flush_delay", &self.terminal_flush_delay)
            .field("has_checkpoint", &self.checkpoint.is_some())
            .finish()
    }
}
