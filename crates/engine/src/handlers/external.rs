//! External-service handlers: llm, http, integration.
//!
//! The engine owns the policy — retry classification, backoff, output
//! shaping — and delegates the actual network call to an injected
//! [`Transport`]. The built-in registrations are stubs; wiring a real
//! client is one `register` call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};
use crate::retry::{RetryPolicy, is_retryable};

/// A failed external call, carrying whatever the provider told us.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable message.
    pub message: String,
    /// HTTP status, when the transport is HTTP-shaped.
    pub status: Option<u16>,
    /// Provider error category (e.g. `overloaded`).
    pub category: Option<String>,
}

impl TransportError {
    /// A terminal error with just a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            category: None,
        }
    }

    /// An error carrying an HTTP status.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
            category: None,
        }
    }
}

/// The injected client an external-service handler calls through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one call. The request is the node's interpolated config.
    async fn call(&self, request: Value) -> Result<Value, TransportError>;
}

/// Call with retries per the engine's classifier: transient provider
/// failures back off exponentially, everything else surfaces immediately.
async fn call_with_retry(
    transport: &Arc<dyn Transport>,
    request: &Value,
    policy: &RetryPolicy,
    ctx: &HandlerContext,
) -> Result<Value, HandlerError> {
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match transport.call(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                let retryable =
                    is_retryable(err.status, err.category.as_deref(), &err.message);
                if !retryable || !policy.allows_retry(attempts) {
                    return Err(HandlerError::Execution(err.message));
                }
                let delay = policy.delay_for(attempts - 1);
                tracing::debug!(
                    node = %ctx.node,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying external call"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = ctx.cancellation.cancelled() => {
                        return Err(HandlerError::Cancelled);
                    }
                }
            }
        }
    }
}

/// Large-language-model calls. Output shape:
/// `{"text", "model", "provider", "tokens"}`.
pub struct LlmHandler {
    transport: Option<Arc<dyn Transport>>,
    policy: RetryPolicy,
}

impl LlmHandler {
    /// A handler with a wired transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport: Some(transport),
            policy,
        }
    }

    /// The unwired stub registered by default.
    #[must_use]
    pub fn stub() -> Self {
        Self {
            transport: None,
            policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl NodeHandler for LlmHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let Some(transport) = &self.transport else {
            return Err(HandlerError::TransportMissing("llm"));
        };
        let request = Value::Object(ctx.config.clone());
        let response = call_with_retry(transport, &request, &self.policy, &ctx).await?;

        let mut output = match response {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert(
                    "text".to_owned(),
                    match other {
                        Value::String(s) => json!(s),
                        v => json!(v.to_string()),
                    },
                );
                map
            }
        };
        for field in ["model", "provider"] {
            if !output.contains_key(field) {
                let value = ctx.config_value(field).cloned().unwrap_or(Value::Null);
                output.insert(field.to_owned(), value);
            }
        }
        output.entry("tokens".to_owned()).or_insert(Value::Null);
        Ok(HandlerOutput::new(output))
    }
}

/// Outbound HTTP requests. Output shape:
/// `{"statusCode", "body", "headers", "latency"}`.
pub struct HttpHandler {
    transport: Option<Arc<dyn Transport>>,
    policy: RetryPolicy,
}

impl HttpHandler {
    /// A handler with a wired transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport: Some(transport),
            policy,
        }
    }

    /// The unwired stub registered by default.
    #[must_use]
    pub fn stub() -> Self {
        Self {
            transport: None,
            policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl NodeHandler for HttpHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let Some(transport) = &self.transport else {
            return Err(HandlerError::TransportMissing("http"));
        };
        if ctx.config_str("url").is_none() {
            return Err(HandlerError::InvalidConfig("http node requires url".into()));
        }

        let request = Value::Object(ctx.config.clone());
        let started = Instant::now();
        let response = call_with_retry(transport, &request, &self.policy, &ctx).await?;
        let latency = started.elapsed().as_millis() as u64;

        let output = match response {
            Value::Object(map) if map.contains_key("statusCode") => {
                let mut map = map;
                map.entry("headers".to_owned()).or_insert_with(|| json!({}));
                map.entry("latency".to_owned()).or_insert_with(|| json!(latency));
                map
            }
            body => {
                let mut map = Map::new();
                map.insert("statusCode".to_owned(), json!(200));
                map.insert("body".to_owned(), body);
                map.insert("headers".to_owned(), json!({}));
                map.insert("latency".to_owned(), json!(latency));
                map
            }
        };
        Ok(HandlerOutput::new(output))
    }
}

/// Third-party integration calls, routed by the `service` config field.
pub struct IntegrationHandler {
    transport: Option<Arc<dyn Transport>>,
    policy: RetryPolicy,
}

impl IntegrationHandler {
    /// A handler with a wired transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport: Some(transport),
            policy,
        }
    }

    /// The unwired stub registered by default.
    #[must_use]
    pub fn stub() -> Self {
        Self {
            transport: None,
            policy: RetryPolicy::default(),
        }
    }
}

#[async_trait]
impl NodeHandler for IntegrationHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let Some(transport) = &self.transport else {
            return Err(HandlerError::TransportMissing("integration"));
        };
        if ctx.config_str("service").is_none() {
            return Err(HandlerError::InvalidConfig(
                "integration node requires service".into(),
            ));
        }
        let request = Value::Object(ctx.config.clone());
        let response = call_with_retry(transport, &request, &self.policy, &ctx).await?;
        Ok(HandlerOutput::from_value(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::ctx;
    use cascade_workflow::NodeType;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Fails `failures` times with the given error, then succeeds.
    struct FlakyTransport {
        failures: Mutex<u32>,
        error: TransportError,
        response: Value,
        calls: Mutex<u32>,
    }

    impl FlakyTransport {
        fn new(failures: u32, error: TransportError, response: Value) -> Self {
            Self {
                failures: Mutex::new(failures),
                error,
                response,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn call(&self, _request: Value) -> Result<Value, TransportError> {
            *self.calls.lock() += 1;
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(self.error.clone());
            }
            Ok(self.response.clone())
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn stub_reports_missing_transport() {
        let err = LlmHandler::stub()
            .execute(ctx(NodeType::Llm, json!({"prompt": "hi"})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::TransportMissing("llm")));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_status_is_retried_until_success() {
        let transport = Arc::new(FlakyTransport::new(
            2,
            TransportError::status(429, "rate limit exceeded"),
            json!({"text": "hello", "model": "m1", "provider": "p1", "tokens": null}),
        ));
        let handler = LlmHandler::new(transport.clone(), quick_policy());

        let out = handler
            .execute(ctx(NodeType::Llm, json!({"prompt": "hi"})))
            .await
            .unwrap();
        assert_eq!(out.output.get("text"), Some(&json!("hello")));
        assert_eq!(*transport.calls.lock(), 3);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let transport = Arc::new(FlakyTransport::new(
            5,
            TransportError::status(401, "invalid api key"),
            json!({}),
        ));
        let handler = LlmHandler::new(transport.clone(), quick_policy());

        let err = handler
            .execute(ctx(NodeType::Llm, json!({"prompt": "hi"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
        assert_eq!(*transport.calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhaust_into_failure() {
        let transport = Arc::new(FlakyTransport::new(
            10,
            TransportError::message("model is currently loading"),
            json!({}),
        ));
        let handler = LlmHandler::new(transport.clone(), quick_policy());

        let err = handler
            .execute(ctx(NodeType::Llm, json!({"prompt": "hi"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("currently loading"));
        assert_eq!(*transport.calls.lock(), 3);
    }

    #[tokio::test]
    async fn llm_fills_missing_fields_from_config() {
        let transport = Arc::new(FlakyTransport::new(0, TransportError::message(""), json!("raw text")));
        let handler = LlmHandler::new(transport, quick_policy());

        let out = handler
            .execute(ctx(
                NodeType::Llm,
                json!({"prompt": "hi", "model": "m2", "provider": "p2"}),
            ))
            .await
            .unwrap();
        assert_eq!(out.output.get("text"), Some(&json!("raw text")));
        assert_eq!(out.output.get("model"), Some(&json!("m2")));
        assert_eq!(out.output.get("provider"), Some(&json!("p2")));
        assert_eq!(out.output.get("tokens"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn http_requires_url() {
        let transport = Arc::new(FlakyTransport::new(0, TransportError::message(""), json!({})));
        let err = HttpHandler::new(transport, quick_policy())
            .execute(ctx(NodeType::Http, json!({"method": "GET"})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn http_wraps_bare_body() {
        let transport = Arc::new(FlakyTransport::new(
            0,
            TransportError::message(""),
            json!({"users": []}),
        ));
        let out = HttpHandler::new(transport, quick_policy())
            .execute(ctx(
                NodeType::Http,
                json!({"url": "https://api.example.com", "method": "GET"}),
            ))
            .await
            .unwrap();
        assert_eq!(out.output.get("statusCode"), Some(&json!(200)));
        assert_eq!(out.output.get("body"), Some(&json!({"users": []})));
        assert!(out.output.contains_key("latency"));
        assert!(out.output.contains_key("headers"));
    }

    #[tokio::test]
    async fn http_passes_shaped_response_through() {
        let transport = Arc::new(FlakyTransport::new(
            0,
            TransportError::message(""),
            json!({"statusCode": 404, "body": "not found"}),
        ));
        let out = HttpHandler::new(transport, quick_policy())
            .execute(ctx(
                NodeType::Http,
                json!({"url": "https://api.example.com"}),
            ))
            .await
            .unwrap();
        assert_eq!(out.output.get("statusCode"), Some(&json!(404)));
    }

    #[tokio::test]
    async fn integration_requires_service() {
        let transport = Arc::new(FlakyTransport::new(0, TransportError::message(""), json!({})));
        let err = IntegrationHandler::new(transport, quick_policy())
            .execute(ctx(NodeType::Integration, json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let transport = Arc::new(FlakyTransport::new(
            10,
            TransportError::status(503, "overloaded"),
            json!({}),
        ));
        let handler = LlmHandler::new(
            transport,
            RetryPolicy {
                max_attempts: 10,
                base_delay: Duration::from_secs(60),
                max_delay: Duration::from_secs(60),
            },
        );
        let context = ctx(NodeType::Llm, json!({"prompt": "hi"}));
        context.cancellation.cancel();

        let err = handler.execute(context).await.unwrap_err();
        assert!(matches!(err, HandlerError::Cancelled));
    }
}
