//! The engine: entry points and live-execution tracking.

use std::sync::Arc;

use cascade_core::{ExecutionId, NodeKey};
use cascade_eventbus::{EventBus, SsePump, SsePumpConfig, SseSubscriber};
use cascade_workflow::BuiltWorkflow;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::options::EngineOptions;
use crate::registry::HandlerRegistry;
use crate::report::ExecutionReport;
use crate::scheduler::Scheduler;
use crate::wait::{SignalDelivery, WaitCoordinator};

/// A live execution's control handles.
struct ExecutionHandle {
    cancellation: CancellationToken,
}

/// The workflow engine.
///
/// Holds the handler registry, the event bus, and the wait coordinator;
/// tracks every live execution so cancellation and signal delivery can be
/// routed by id. Executions are independent — the only shared state is
/// the bus (partitioned per execution) and the wait table (keyed per
/// execution and node).
pub struct Engine {
    registry: Arc<HandlerRegistry>,
    bus: Arc<EventBus>,
    waits: Arc<WaitCoordinator>,
    executions: DashMap<ExecutionId, ExecutionHandle>,
}

impl Engine {
    /// An engine over the given registry.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            bus: Arc::new(EventBus::default()),
            waits: Arc::new(WaitCoordinator::new()),
            executions: DashMap::new(),
        }
    }

    /// An engine with every built-in handler registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new(crate::handlers::builtin_registry())
    }

    /// The event bus, for subscribing to executions.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The wait coordinator.
    #[must_use]
    pub fn waits(&self) -> &Arc<WaitCoordinator> {
        &self.waits
    }

    /// Run a workflow to completion and return its report.
    ///
    /// Setup failures (uncovered node types) error out before anything
    /// runs; a workflow that starts always yields a report, failed or not.
    pub async fn run_execution(
        &self,
        workflow: Arc<BuiltWorkflow>,
        inputs: Map<String, Value>,
        options: EngineOptions,
    ) -> Result<ExecutionReport, EngineError> {
        let execution_id = ExecutionId::v4();
        self.run_with_id(execution_id, workflow, inputs, options).await
    }

    /// Run a workflow, streaming its events onto an SSE subscriber.
    ///
    /// The subscriber receives `connected` immediately, every event as the
    /// execution progresses, and is closed `terminal_flush_delay` after
    /// the terminal event.
    pub async fn run_execution_streaming(
        &self,
        workflow: Arc<BuiltWorkflow>,
        inputs: Map<String, Value>,
        options: EngineOptions,
        subscriber: Arc<SseSubscriber>,
    ) -> Result<ExecutionReport, EngineError> {
        let execution_id = ExecutionId::v4();
        let pump = SsePump::new(
            self.bus.subscribe(execution_id),
            subscriber,
            SsePumpConfig {
                keep_alive_interval: options.keep_alive_interval,
                terminal_flush_delay: options.terminal_flush_delay,
            },
        );
        let pump_task = tokio::spawn(pump.run());

        let report = self.run_with_id(execution_id, workflow, inputs, options).await;

        // Dropping the channel lets the pump drain what is buffered, flush
        // the terminal event, and end — even when setup failed before any
        // event was emitted.
        self.bus.drop_execution(execution_id);
        let _ = pump_task.await;
        report
    }

    async fn run_with_id(
        &self,
        execution_id: ExecutionId,
        workflow: Arc<BuiltWorkflow>,
        inputs: Map<String, Value>,
        options: EngineOptions,
    ) -> Result<ExecutionReport, EngineError> {
        self.registry.validate_coverage(&workflow)?;

        let cancellation = CancellationToken::new();
        self.executions.insert(
            execution_id,
            ExecutionHandle {
                cancellation: cancellation.clone(),
            },
        );

        let scheduler = Scheduler::new(
            execution_id,
            workflow,
            self.registry.clone(),
            self.bus.clone(),
            self.waits.clone(),
            options,
            cancellation,
        );
        let report = scheduler.run(inputs).await;

        self.executions.remove(&execution_id);
        self.waits.remove_execution(execution_id);
        Ok(report)
    }

    /// Request cancellation of a live execution. Returns `false` when the
    /// execution is unknown (already finished or never started).
    pub fn cancel_execution(&self, execution_id: ExecutionId) -> bool {
        match self.executions.get(&execution_id) {
            Some(handle) => {
                handle.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    /// Deliver a signal to a pending wait. First delivery wins; later ones
    /// report `already-resolved`.
    pub fn deliver_signal(
        &self,
        execution_id: ExecutionId,
        node: &NodeKey,
        payload: Map<String, Value>,
    ) -> SignalDelivery {
        self.waits.deliver(execution_id, node, payload)
    }

    /// Number of currently live executions.
    #[must_use]
    pub fn live_executions(&self) -> usize {
        self.executions.len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("live_executions", &self.live_executions())
            .finish_non_exhaustive()
    }
}
