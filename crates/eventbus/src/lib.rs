#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Eventbus
//!
//! Per-execution event distribution for the Cascade workflow engine:
//!
//! - [`ExecutionEvent`] — the lifecycle and streaming event taxonomy
//! - [`EventBus`] — a partitioned publisher: events for one execution never
//!   reach another execution's subscribers
//! - [`SseSubscriber`] / [`SsePump`] — an adapter that drives a subscription
//!   onto an SSE-style sink with keepalives, disconnect detection, and the
//!   terminal flush delay
//! - [`EventFilter`] — drops or transforms events when multiplexing a
//!   shared channel down to one consumer
//!
//! Events are fire-and-forget projections. Losing a subscriber never kills
//! the execution.

pub mod bus;
pub mod event;
pub mod filter;
pub mod sse;
pub mod subscriber;

pub use bus::{EventBus, EventSubscription};
pub use event::ExecutionEvent;
pub use filter::EventFilter;
pub use sse::{SSE_RESPONSE_HEADERS, SsePump, SsePumpConfig, format_comment, format_event};
pub use subscriber::{SinkError, SseSink, SseSubscriber};
