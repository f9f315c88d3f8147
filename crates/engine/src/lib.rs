#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Engine
//!
//! The execution engine for Cascade workflows:
//!
//! - [`Engine`] — entry point: runs workflows, tracks live executions,
//!   routes cancellation and wait signals
//! - [`Scheduler`] — one logical scheduler per execution, draining the
//!   ready set into a bounded pool of parallel handler tasks
//! - [`NodeHandler`] / [`HandlerRegistry`] — the polymorphic node dispatch
//!   table, with built-in handlers for every core node type
//! - [`WaitCoordinator`] — pending human-input/timer/event waits with
//!   timeout and cancellation, signal delivery idempotent-to-first
//! - [`retry`] — the retryable-error classifier and backoff schedule used
//!   by handlers that talk to external services

pub mod engine;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod options;
pub mod registry;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod wait;

pub use engine::Engine;
pub use error::EngineError;
pub use handler::{HandlerContext, HandlerError, HandlerOutput, HandlerServices, NodeHandler};
pub use options::{CheckpointSink, EngineOptions};
pub use registry::HandlerRegistry;
pub use report::{ExecutionFailure, ExecutionReport};
pub use scheduler::Scheduler;
pub use wait::{SignalDelivery, WaitCoordinator};
