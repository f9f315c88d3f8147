#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Core
//!
//! Core types for the Cascade workflow engine. This crate provides the
//! fundamental building blocks used by all other Cascade crates:
//!
//! - **Identifiers**: [`ExecutionId`], [`WorkflowId`] — typed UUID wrappers
//! - **Node keys**: [`NodeKey`] — validated, user-authored node identifiers
//! - **Handles**: [`HandleType`] — edge handle tags (`true`, `false`,
//!   `loop-body`, ...) driving conditional and loop routing
//! - **Error taxonomy**: [`ErrorKind`] — the design-level failure kinds
//!   surfaced on terminal events

pub mod handle;
pub mod id;
pub mod key;
pub mod kind;

pub use handle::HandleType;
pub use id::{ExecutionId, WorkflowId};
pub use key::{NodeKey, NodeKeyError};
pub use kind::ErrorKind;
