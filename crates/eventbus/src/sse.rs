//! SSE wire formatting and the subscriber pump.
//!
//! The pub/sub surface is transport-agnostic; this module owns everything
//! SSE-specific: frame layout, response headers, the keepalive timer, and
//! the terminal flush delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::bus::EventSubscription;
use crate::event::ExecutionEvent;
use crate::filter::EventFilter;
use crate::subscriber::SseSubscriber;

/// Response headers an HTTP layer sets when mounting a stream.
pub const SSE_RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
    ("X-Accel-Buffering", "no"),
];

/// The keepalive comment body.
pub const KEEPALIVE_COMMENT: &str = "keepalive";

/// Format one event frame: `event: <type>\ndata: <minified-json>\n\n`.
#[must_use]
pub fn format_event(event: &ExecutionEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.event_type(), event.data_json())
}

/// Format one comment frame: `: <text>\n\n`.
#[must_use]
pub fn format_comment(text: &str) -> String {
    format!(": {text}\n\n")
}

/// Timing knobs for an [`SsePump`].
#[derive(Debug, Clone)]
pub struct SsePumpConfig {
    /// Keepalive comment cadence.
    pub keep_alive_interval: Duration,
    /// Grace period between a terminal event and `close()`, letting the
    /// network buffer drain.
    pub terminal_flush_delay: Duration,
}

impl Default for SsePumpConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(30),
            terminal_flush_delay: Duration::from_millis(500),
        }
    }
}

/// Drives one subscription onto one subscriber connection.
///
/// Runs until a terminal event is flushed, the channel closes, or a write
/// fails. Keepalive comments go out every `keep_alive_interval` and stop
/// the moment the connection is marked closed.
pub struct SsePump {
    subscription: EventSubscription,
    subscriber: Arc<SseSubscriber>,
    config: SsePumpConfig,
    filter: Option<EventFilter>,
}

impl SsePump {
    /// Wire a subscription to a subscriber.
    #[must_use]
    pub fn new(
        subscription: EventSubscription,
        subscriber: Arc<SseSubscriber>,
        config: SsePumpConfig,
    ) -> Self {
        Self {
            subscription,
            subscriber,
            config,
            filter: None,
        }
    }

    /// Drop or rewrite events before they reach the subscriber.
    #[must_use]
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Pump until the stream ends. Consumes the pump; typically spawned.
    pub async fn run(mut self) {
        let mut keepalive = tokio::time::interval_at(
            Instant::now() + self.config.keep_alive_interval,
            self.config.keep_alive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.subscription.recv() => {
                    let Some(event) = event else {
                        // Producer is gone without a terminal event
                        // (cleanup path): just close.
                        self.subscriber.close();
                        break;
                    };
                    let event = match &self.filter {
                        Some(filter) => match filter.apply(&event) {
                            Some(event) => event,
                            None => continue,
                        },
                        None => event,
                    };
                    let terminal = event.is_terminal();
                    if self.subscriber.send(&event).is_err() {
                        break; // write failure already fired disconnect
                    }
                    if terminal {
                        tokio::time::sleep(self.config.terminal_flush_delay).await;
                        self.subscriber.close();
                        break;
                    }
                }
                _ = keepalive.tick() => {
                    if !self.subscriber.is_connected()
                        || self.subscriber.send_comment(KEEPALIVE_COMMENT).is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::subscriber::{SinkError, SseSink};
    use cascade_core::ExecutionId;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl SseSink for RecordingSink {
        fn write_frame(&self, frame: &str) -> Result<(), SinkError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(SinkError::Write("broken pipe".into()));
            }
            self.frames.lock().push(frame.to_owned());
            Ok(())
        }
    }

    #[test]
    fn event_frame_format() {
        let event = ExecutionEvent::Paused {
            execution_id: ExecutionId::v4(),
        };
        let frame = format_event(&event);
        assert!(frame.starts_with("event: paused\ndata: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn comment_frame_format() {
        assert_eq!(format_comment("keepalive"), ": keepalive\n\n");
    }

    #[test]
    fn response_headers_cover_sse_requirements() {
        let headers: std::collections::HashMap<_, _> =
            SSE_RESPONSE_HEADERS.iter().copied().collect();
        assert_eq!(headers["Content-Type"], "text/event-stream");
        assert_eq!(headers["Cache-Control"], "no-cache");
        assert_eq!(headers["Connection"], "keep-alive");
        assert_eq!(headers["X-Accel-Buffering"], "no");
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_ticks_on_schedule() {
        let bus = EventBus::default();
        let id = ExecutionId::v4();
        let sink = Arc::new(RecordingSink::default());
        let subscriber = Arc::new(SseSubscriber::new(sink.clone()));
        let pump = SsePump::new(bus.subscribe(id), subscriber.clone(), SsePumpConfig::default());
        let handle = tokio::spawn(pump.run());

        // The connected event goes out immediately.
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(sink.frames.lock().len(), 1);

        // No keepalive before the interval elapses.
        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(sink.frames.lock().len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(sink.frames.lock().last().unwrap(), ": keepalive\n\n");

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(
            sink.frames
                .lock()
                .iter()
                .filter(|f| f.starts_with(": keepalive"))
                .count(),
            2
        );

        subscriber.close();
        bus.drop_execution(id);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_event_flushes_then_closes() {
        let bus = EventBus::default();
        let id = ExecutionId::v4();
        let sink = Arc::new(RecordingSink::default());
        let subscriber = Arc::new(SseSubscriber::new(sink.clone()));
        let pump = SsePump::new(bus.subscribe(id), subscriber.clone(), SsePumpConfig::default());
        let handle = tokio::spawn(pump.run());
        tokio::time::advance(Duration::from_millis(1)).await;

        bus.emit(ExecutionEvent::Complete {
            execution_id: id,
            outputs: json!({"done": true}),
        });
        tokio::time::advance(Duration::from_millis(100)).await;

        // The terminal event is written but the connection stays open
        // during the flush window.
        assert!(sink.frames.lock().iter().any(|f| f.starts_with("event: complete")));
        assert!(subscriber.is_connected());

        tokio::time::advance(Duration::from_millis(400)).await;
        handle.await.unwrap();
        assert!(!subscriber.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_suppressed_after_close() {
        let bus = EventBus::default();
        let id = ExecutionId::v4();
        let sink = Arc::new(RecordingSink::default());
        let subscriber = Arc::new(SseSubscriber::new(sink.clone()));
        let pump = SsePump::new(bus.subscribe(id), subscriber.clone(), SsePumpConfig::default());
        let handle = tokio::spawn(pump.run());
        tokio::time::advance(Duration::from_millis(1)).await;

        subscriber.close();
        tokio::time::advance(Duration::from_secs(90)).await;
        handle.await.unwrap();

        let keepalives = sink
            .frames
            .lock()
            .iter()
            .filter(|f| f.starts_with(": keepalive"))
            .count();
        assert_eq!(keepalives, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_stops_the_pump() {
        let bus = EventBus::default();
        let id = ExecutionId::v4();
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, Ordering::Relaxed);
        let subscriber = Arc::new(SseSubscriber::new(sink));
        let pump = SsePump::new(bus.subscribe(id), subscriber.clone(), SsePumpConfig::default());
        let handle = tokio::spawn(pump.run());
        tokio::time::advance(Duration::from_millis(1)).await;

        handle.await.unwrap();
        assert!(!subscriber.is_connected());
    }
}
