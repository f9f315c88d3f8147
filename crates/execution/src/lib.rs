#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Execution
//!
//! Runtime execution state for the Cascade workflow engine. This crate
//! models execution-time concepts — it does NOT contain the scheduler:
//!
//! - [`ContextSnapshot`] — immutable snapshots of node outputs, workflow
//!   variables, and inputs, with structural sharing between versions
//! - [`ExecutionQueue`] — dependency-ordered readiness tracking with
//!   conditional skip propagation, failure cascade, and loop resets
//! - [`ExecutionStatus`] — the execution lifecycle, with legal moves
//!   derived from the scheduler's dispatch/pause/drain behavior

pub mod error;
pub mod queue;
pub mod snapshot;
pub mod status;

pub use error::ExecutionError;
pub use queue::{CascadeEffect, ExecutionQueue, QueueSummary};
pub use snapshot::{ContextSnapshot, SnapshotMetadata};
pub use status::ExecutionStatus;
