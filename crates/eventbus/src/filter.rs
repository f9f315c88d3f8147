//! Filtered re-publication.
//!
//! When a cluster shares one wide event channel, a filter narrows it down
//! to a single consumer's slice: drop events whose payload field does not
//! match, or rewrite them through a transform.

use std::sync::Arc;

use serde_json::Value;

use crate::event::ExecutionEvent;

/// Event filter/transform applied before delivery to one subscriber.
#[derive(Clone)]
pub struct EventFilter {
    field: Option<(String, Value)>,
    transform: Option<Arc<dyn Fn(&ExecutionEvent) -> Option<ExecutionEvent> + Send + Sync>>,
}

impl EventFilter {
    /// Keep only events whose serialized payload has `field == value`.
    #[must_use]
    pub fn by_field(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: Some((field.into(), value)),
            transform: None,
        }
    }

    /// Keep events the transform maps to `Some`, in rewritten form.
    #[must_use]
    pub fn by_transform(
        transform: impl Fn(&ExecutionEvent) -> Option<ExecutionEvent> + Send + Sync + 'static,
    ) -> Self {
        Self {
            field: None,
            transform: Some(Arc::new(transform)),
        }
    }

    /// Add a transform on top of a field match.
    #[must_use]
    pub fn with_transform(
        mut self,
        transform: impl Fn(&ExecutionEvent) -> Option<ExecutionEvent> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Apply the filter. `None` means the event is dropped.
    #[must_use]
    pub fn apply(&self, event: &ExecutionEvent) -> Option<ExecutionEvent> {
        if let Some((field, expected)) = &self.field {
            let data = serde_json::to_value(event).ok()?;
            if data.get(field) != Some(expected) {
                return None;
            }
        }
        match &self.transform {
            Some(transform) => transform(event),
            None => Some(event.clone()),
        }
    }
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("field", &self.field)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}
