//! The per-execution scheduler.
//!
//! One logical scheduler drives one execution: it drains the queue's ready
//! set into a bounded set of parallel handler tasks, adopts their outputs
//! into fresh context snapshots, and reports every settlement back to the
//! queue. Wait nodes sit in `executing` without consuming a concurrency
//! slot, so the execution keeps flowing around a pending approval.
//!
//! The scheduler never retries and never blocks on external I/O except to
//! await at least one in-flight handler.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use cascade_core::{ErrorKind, ExecutionId, NodeKey};
use cascade_eventbus::{EventBus, ExecutionEvent};
use cascade_execution::{CascadeEffect, ContextSnapshot, ExecutionQueue, ExecutionStatus};
use cascade_expression::interpolate_value;
use cascade_workflow::{BuiltWorkflow, ErrorPolicy, LoopContext, NodeType};
use serde_json::{Map, Value, json};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, HandlerServices};
use crate::options::EngineOptions;
use crate::registry::HandlerRegistry;
use crate::report::{ExecutionFailure, ExecutionReport};
use crate::wait::WaitCoordinator;

/// One execution's scheduler. Constructed by the [`Engine`](crate::Engine);
/// consumed by [`run`](Scheduler::run).
pub struct Scheduler {
    execution_id: ExecutionId,
    workflow: Arc<BuiltWorkflow>,
    registry: Arc<HandlerRegistry>,
    bus: Arc<EventBus>,
    waits: Arc<WaitCoordinator>,
    options: EngineOptions,
    cancellation: CancellationToken,
}

/// Mutable state threaded through one run.
struct RunState {
    snapshot: ContextSnapshot,
    queue: ExecutionQueue,
    /// Completed body passes per loop controller.
    iterations: HashMap<NodeKey, u32>,
    /// First terminal failure, if any.
    failure: Option<ExecutionFailure>,
    /// Wait-type nodes currently in flight (exempt from the cap).
    waiting: HashSet<NodeKey>,
    paused_emitted: bool,
}

impl Scheduler {
    /// Assemble a scheduler for one execution.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow: Arc<BuiltWorkflow>,
        registry: Arc<HandlerRegistry>,
        bus: Arc<EventBus>,
        waits: Arc<WaitCoordinator>,
        options: EngineOptions,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            workflow,
            registry,
            bus,
            waits,
            options,
            cancellation,
        }
    }

    /// Drive the execution to a terminal state.
    pub async fn run(self, inputs: Map<String, Value>) -> ExecutionReport {
        let started = Instant::now();
        let mut status = ExecutionStatus::Created;
        let _ = status.transition_to(ExecutionStatus::Running);

        let mut snapshot = ContextSnapshot::new(inputs);
        for (name, value) in &self.workflow.variables {
            snapshot = snapshot.with_variable(name, value.clone());
        }
        let mut state = RunState {
            snapshot,
            queue: ExecutionQueue::new(&self.workflow),
            iterations: HashMap::new(),
            failure: None,
            waiting: HashSet::new(),
            paused_emitted: false,
        };

        tracing::info!(
            execution_id = %self.execution_id,
            workflow = %self.workflow.name,
            nodes = self.workflow.node_count(),
            "execution started"
        );
        self.bus.emit(ExecutionEvent::ExecutionStarted {
            execution_id: self.execution_id,
            workflow_id: self.workflow.id,
            total_nodes: self.workflow.node_count(),
        });

        let max_concurrent = self
            .options
            .max_concurrent_nodes
            .unwrap_or(self.workflow.max_concurrent_nodes)
            .max(1);
        let deadline = self
            .options
            .workflow_timeout
            .map(|t| tokio::time::Instant::now() + t);

        let mut join_set: JoinSet<(NodeKey, Result<HandlerOutput, HandlerError>)> = JoinSet::new();
        let mut cancelling = false;
        let mut timed_out = false;

        loop {
            if !cancelling {
                let busy = join_set.len().saturating_sub(state.waiting.len());
                let cap = max_concurrent.saturating_sub(busy);
                if cap > 0 {
                    let ready = state.queue.ready_nodes(&self.workflow, cap);
                    if !ready.is_empty() {
                        state.queue.mark_executing(&ready);
                        for node in ready {
                            self.dispatch(node, &state.snapshot, &mut state.waiting, &mut join_set);
                        }
                    }
                }
                self.maybe_emit_paused(&mut state, &mut status, &join_set);
            }

            if join_set.is_empty() {
                if cancelling || state.queue.is_complete() {
                    break;
                }
                // Nothing in flight and nothing dispatchable, yet work
                // remains: the graph cannot make progress.
                tracing::error!(
                    execution_id = %self.execution_id,
                    summary = ?state.queue.summary(),
                    "scheduler deadlock"
                );
                state.failure = Some(ExecutionFailure {
                    kind: ErrorKind::Deadlock,
                    message: "no executing and no ready nodes while work remains pending".into(),
                    node: None,
                });
                break;
            }

            tokio::select! {
                joined = join_set.join_next() => {
                    match joined {
                        Some(Ok((node, result))) => {
                            state.waiting.remove(&node);
                            state.paused_emitted = false;
                            if status == ExecutionStatus::Paused {
                                let _ = status.transition_to(ExecutionStatus::Running);
                            }
                            self.settle(&node, result, &mut state, cancelling);
                        }
                        Some(Err(join_err)) => {
                            tracing::error!(
                                execution_id = %self.execution_id,
                                ?join_err,
                                "node task panicked"
                            );
                            if state.failure.is_none() {
                                state.failure = Some(ExecutionFailure {
                                    kind: ErrorKind::HandlerError,
                                    message: format!("node task panicked: {join_err}"),
                                    node: None,
                                });
                            }
                            cancelling = true;
                            self.cancellation.cancel();
                        }
                        None => {}
                    }
                }
                () = self.cancellation.cancelled(), if !cancelling => {
                    cancelling = true;
                    if state.failure.is_none() {
                        state.failure = Some(ExecutionFailure {
                            kind: ErrorKind::Cancelled,
                            message: "execution cancelled".into(),
                            node: None,
                        });
                    }
                    let _ = status.transition_to(ExecutionStatus::Cancelling);
                    tracing::info!(execution_id = %self.execution_id, "cancellation requested");
                }
                () = sleep_until_or_forever(deadline), if deadline.is_some() && !cancelling => {
                    timed_out = true;
                    state.failure = Some(ExecutionFailure {
                        kind: ErrorKind::Timeout,
                        message: "workflow timeout elapsed".into(),
                        node: None,
                    });
                    // A timeout takes the cancellation path: stop
                    // dispatching, drain in-flight handlers.
                    cancelling = true;
                    self.cancellation.cancel();
                    let _ = status.transition_to(ExecutionStatus::Cancelling);
                    tracing::warn!(execution_id = %self.execution_id, "workflow timed out");
                }
            }
        }

        self.finish(state, status, started, cancelling, timed_out)
    }

    /// Spawn one node's handler into the join set.
    fn dispatch(
        &self,
        node: NodeKey,
        snapshot: &ContextSnapshot,
        waiting: &mut HashSet<NodeKey>,
        join_set: &mut JoinSet<(NodeKey, Result<HandlerOutput, HandlerError>)>,
    ) {
        let Some(built) = self.workflow.node(&node) else {
            return;
        };
        let node_type = built.node_type();
        let Some(handler) = self.registry.get(node_type) else {
            // Coverage is validated before the run; this is unreachable in
            // practice but must not wedge the queue.
            let missing = node.clone();
            join_set.spawn(async move {
                let err = HandlerError::Execution("no handler registered".into());
                (missing, Err(err))
            });
            return;
        };

        let config = match interpolate_value(
            &Value::Object(built.definition.config.clone()),
            &snapshot.execution_context(),
        ) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let loop_context = self.loop_context_for(&node, node_type);
        let ctx = HandlerContext {
            execution_id: self.execution_id,
            workflow_id: self.workflow.id,
            node: node.clone(),
            node_type,
            config,
            snapshot: snapshot.clone(),
            dependencies: built.dependencies.clone(),
            loop_context,
            cancellation: self.cancellation.child_token(),
            services: HandlerServices {
                bus: self.bus.clone(),
                waits: self.waits.clone(),
            },
        };

        tracing::debug!(execution_id = %self.execution_id, node = %node, %node_type, "dispatching node");
        self.bus.emit(ExecutionEvent::NodeStarted {
            execution_id: self.execution_id,
            node: node.clone(),
        });
        if node_type == NodeType::Wait {
            waiting.insert(node.clone());
        }
        join_set.spawn(async move { (ctx.node.clone(), handler.execute(ctx).await) });
    }

    /// The loop context a handler needs, by role.
    fn loop_context_for(&self, node: &NodeKey, node_type: NodeType) -> Option<LoopContext> {
        match node_type {
            NodeType::Loop => self.workflow.loop_context(node).cloned(),
            NodeType::LoopEnd => self.workflow.loop_ending_at(node).cloned(),
            _ => self.workflow.loop_containing(node).cloned(),
        }
    }

    /// Adopt one handler result into the queue and snapshot.
    fn settle(
        &self,
        node: &NodeKey,
        result: Result<HandlerOutput, HandlerError>,
        state: &mut RunState,
        cancelling: bool,
    ) {
        let error_policy = self
            .workflow
            .node(node)
            .map_or(ErrorPolicy::Cascade, |n| n.definition.error_policy);

        match result {
            Ok(output) => self.settle_success(node, output, state),
            Err(HandlerError::Cancelled) if cancelling => {
                // Quiet teardown: cancellation is not a node-level failure.
                let _ = state.queue.mark_failed(node, "cancelled", &self.workflow);
            }
            Err(err) if error_policy == ErrorPolicy::Continue => {
                tracing::warn!(
                    execution_id = %self.execution_id,
                    node = %node,
                    error = %err,
                    "node failed, continuing per error policy"
                );
                let mut output = Map::new();
                output.insert("error".to_owned(), json!(true));
                output.insert("message".to_owned(), json!(err.to_string()));
                self.settle_success(node, HandlerOutput::new(output), state);
            }
            Err(err) => {
                tracing::warn!(
                    execution_id = %self.execution_id,
                    node = %node,
                    error = %err,
                    "node failed"
                );
                let effects = state.queue.mark_failed(node, err.to_string(), &self.workflow);
                self.bus.emit(ExecutionEvent::NodeFailed {
                    execution_id: self.execution_id,
                    node: node.clone(),
                    error: err.to_string(),
                });
                self.emit_effects(&effects);
                if state.failure.is_none() {
                    state.failure = Some(ExecutionFailure {
                        kind: ErrorKind::HandlerError,
                        message: err.to_string(),
                        node: Some(node.clone()),
                    });
                }
                self.after_settlement(state);
            }
        }
    }

    fn settle_success(&self, node: &NodeKey, result: HandlerOutput, state: &mut RunState) {
        for (name, value) in result.set_variables {
            state.snapshot = state.snapshot.with_variable(name, value);
        }
        let mut output = result.output;

        if let Some(loop_ctx) = self.workflow.loop_ending_at(node).cloned() {
            self.settle_loop_end(node, &loop_ctx, &mut output, state);
            return;
        }

        state.snapshot = state.snapshot.with_node_output(node.clone(), output.clone());
        let effects = state.queue.mark_completed(node, &output, &self.workflow);
        self.bus.emit(ExecutionEvent::NodeCompleted {
            execution_id: self.execution_id,
            node: node.clone(),
            output: Value::Object(output),
        });
        self.emit_effects(&effects);
        self.after_settlement(state);
    }

    /// A completed loop-end either re-enters the body or opens the exit
    /// edges. The max-iterations cap is enforced here, overriding the
    /// handler's `continueLoop` when exhausted.
    fn settle_loop_end(
        &self,
        node: &NodeKey,
        loop_ctx: &LoopContext,
        output: &mut Map<String, Value>,
        state: &mut RunState,
    ) {
        let completed = state
            .iterations
            .get(&loop_ctx.loop_node)
            .copied()
            .unwrap_or(0)
            + 1;
        state.iterations.insert(loop_ctx.loop_node.clone(), completed);

        let wants_continue = output.get("continueLoop").and_then(Value::as_bool) == Some(true);
        if wants_continue && completed >= loop_ctx.max_iterations {
            tracing::warn!(
                execution_id = %self.execution_id,
                loop_node = %loop_ctx.loop_node,
                max_iterations = loop_ctx.max_iterations,
                "loop hit its iteration cap"
            );
            output.insert("continueLoop".to_owned(), json!(false));
            output.insert("maxIterationsReached".to_owned(), json!(true));
        }
        let continuing = output.get("continueLoop").and_then(Value::as_bool) == Some(true);

        state.snapshot = state.snapshot.with_node_output(node.clone(), output.clone());
        let effects = state.queue.mark_completed(node, output, &self.workflow);
        self.bus.emit(ExecutionEvent::NodeCompleted {
            execution_id: self.execution_id,
            node: node.clone(),
            output: Value::Object(output.clone()),
        });

        // The loop counter is visible to the body via the iteration
        // variable, whether or not another pass follows.
        state.snapshot = state
            .snapshot
            .with_variable(&loop_ctx.iteration_variable, json!(completed));

        if continuing {
            if let Some(items) = state
                .snapshot
                .variable(&loop_ctx.items_variable())
                .and_then(Value::as_array)
                .cloned()
            {
                let next = items.get(completed as usize).cloned().unwrap_or(Value::Null);
                state.snapshot = state.snapshot.with_variable(loop_ctx.item_variable(), next);
            }
            self.bus.emit(ExecutionEvent::IterationCompleted {
                execution_id: self.execution_id,
                loop_node: loop_ctx.loop_node.clone(),
                iteration: completed - 1,
            });
            let reset_set = loop_ctx.reset_set();
            // Inner loops restart from scratch on every outer pass.
            for member in &reset_set {
                if self.workflow.loop_context(member).is_some() {
                    state.iterations.remove(member);
                }
            }
            state.queue.reset_for_iteration(&reset_set, &self.workflow);
        } else {
            self.emit_effects(&effects);
        }
        self.after_settlement(state);
    }

    fn emit_effects(&self, effects: &[CascadeEffect]) {
        for effect in effects {
            match effect {
                CascadeEffect::Promoted(_) => {}
                CascadeEffect::Skipped(node) => {
                    self.bus.emit(ExecutionEvent::NodeSkipped {
                        execution_id: self.execution_id,
                        node: node.clone(),
                    });
                }
                CascadeEffect::Failed { node, error } => {
                    self.bus.emit(ExecutionEvent::NodeFailed {
                        execution_id: self.execution_id,
                        node: node.clone(),
                        error: error.clone(),
                    });
                }
            }
        }
    }

    /// Checkpoint and progress reporting after every settlement.
    fn after_settlement(&self, state: &mut RunState) {
        if let Some(sink) = &self.options.checkpoint {
            sink.save(self.execution_id, &state.snapshot, &state.queue);
        }
        let summary = state.queue.summary();
        self.bus.emit(ExecutionEvent::ExecutionProgress {
            execution_id: self.execution_id,
            completed: summary.completed + summary.failed + summary.skipped,
            total: summary.total(),
        });
    }

    /// When only waits remain in flight, move to `Paused` and say so once.
    fn maybe_emit_paused(
        &self,
        state: &mut RunState,
        status: &mut ExecutionStatus,
        join_set: &JoinSet<(NodeKey, Result<HandlerOutput, HandlerError>)>,
    ) {
        let only_waits = !join_set.is_empty() && state.waiting.len() == join_set.len();
        if only_waits
            && !state.paused_emitted
            && state.queue.ready_nodes(&self.workflow, 1).is_empty()
        {
            state.paused_emitted = true;
            let _ = status.transition_to(ExecutionStatus::Paused);
            self.bus.emit(ExecutionEvent::Paused {
                execution_id: self.execution_id,
            });
        }
    }

    /// Publish the terminal event and assemble the report.
    fn finish(
        &self,
        state: RunState,
        mut status: ExecutionStatus,
        started: Instant,
        cancelling: bool,
        timed_out: bool,
    ) -> ExecutionReport {
        let final_status = if timed_out {
            ExecutionStatus::TimedOut
        } else if cancelling {
            ExecutionStatus::Cancelled
        } else if state.failure.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        let _ = status.transition_to(final_status);

        let final_outputs = state.snapshot.final_outputs(&self.workflow.output_nodes);
        match &state.failure {
            Some(failure) => {
                tracing::warn!(
                    execution_id = %self.execution_id,
                    kind = %failure.kind,
                    message = %failure.message,
                    "execution finished with failure"
                );
                self.bus.emit(ExecutionEvent::Failed {
                    execution_id: self.execution_id,
                    kind: failure.kind,
                    message: failure.message.clone(),
                    node: failure.node.clone(),
                });
            }
            None => {
                tracing::info!(
                    execution_id = %self.execution_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "execution completed"
                );
                self.bus.emit(ExecutionEvent::Complete {
                    execution_id: self.execution_id,
                    outputs: Value::Object(final_outputs.clone()),
                });
            }
        }

        ExecutionReport {
            execution_id: self.execution_id,
            workflow_id: self.workflow.id,
            status: final_status,
            final_outputs,
            summary: state.queue.summary(),
            duration: started.elapsed(),
            error: state.failure,
        }
    }
}

/// Sleep until the deadline, or forever when none is configured. The
/// caller's branch guard keeps the forever arm from ever being taken.
async fn sleep_until_or_forever(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
