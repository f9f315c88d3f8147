//! Subscriber handles over SSE-style sinks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::event::ExecutionEvent;
use crate::sse::{format_comment, format_event};

/// A failed write to a subscriber's transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The connection is already closed.
    #[error("subscriber connection closed")]
    Closed,
    /// The transport write failed.
    #[error("subscriber write failed: {0}")]
    Write(String),
}

/// Where SSE frames go — typically an HTTP response body. Implementations
/// report write failures so the subscriber can detect disconnects.
pub trait SseSink: Send + Sync {
    /// Write one complete frame (event or comment, terminator included).
    fn write_frame(&self, frame: &str) -> Result<(), SinkError>;
}

/// One subscriber connection.
///
/// A write failure (or an explicit [`close`](Self::close)) marks the
/// subscriber disconnected, fires every registered disconnect handler
/// exactly once, and rejects further sends. Subscriber failures are
/// isolated: the caller logs them and moves on.
pub struct SseSubscriber {
    sink: Arc<dyn SseSink>,
    connected: AtomicBool,
    on_disconnect: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl SseSubscriber {
    /// Wrap a sink into a connected subscriber.
    pub fn new(sink: Arc<dyn SseSink>) -> Self {
        Self {
            sink,
            connected: AtomicBool::new(true),
            on_disconnect: Mutex::new(Vec::new()),
        }
    }

    /// Send one event frame.
    pub fn send(&self, event: &ExecutionEvent) -> Result<(), SinkError> {
        self.write(&format_event(event))
    }

    /// Send one comment frame (used for keepalives).
    pub fn send_comment(&self, text: &str) -> Result<(), SinkError> {
        self.write(&format_comment(text))
    }

    /// Register a handler to run when the connection closes. Runs
    /// immediately if already disconnected.
    pub fn on_disconnect(&self, handler: impl FnOnce() + Send + 'static) {
        if self.is_connected() {
            let mut handlers = self.on_disconnect.lock();
            // Re-check under the lock so a racing disconnect cannot strand
            // the handler in the vec.
            if self.is_connected() {
                handlers.push(Box::new(handler));
                return;
            }
        }
        handler();
    }

    /// Mark the connection closed and fire disconnect handlers once.
    pub fn close(&self) {
        self.disconnect();
    }

    /// `true` until a write fails or the subscriber is closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn write(&self, frame: &str) -> Result<(), SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Closed);
        }
        match self.sink.write_frame(frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.disconnect();
                Err(err)
            }
        }
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let handlers = std::mem::take(&mut *self.on_disconnect.lock());
            for handler in handlers {
                handler();
            }
        }
    }
}

impl std::fmt::Debug for SseSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseSubscriber")
            .field("connected", &self.is_connected())
            .finish()
    }
}
