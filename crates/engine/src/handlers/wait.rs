//! The wait handler: human-input, timer, and event waits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};

/// Suspends the node until a signal, a timer, or cancellation resolves it.
///
/// Config: `{"waitType": "human-input"|"timer"|"event", "timeoutMs": <ms>,
/// "durationMs": <ms>, "notify": <target>}`. Exactly one resolution wins:
///
/// - a delivered signal → the payload becomes the output (timestamped)
/// - the timeout → `{"timedOut": true}`
/// - cancellation → `{"cancelled": true}`
///
/// The node sits in `executing` for the whole wait; the scheduler keeps
/// dispatching other ready nodes around it.
#[derive(Debug, Default)]
pub struct WaitHandler;

#[async_trait]
impl NodeHandler for WaitHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let wait_type = ctx.config_str("waitType").unwrap_or("human-input").to_owned();

        if let Some(target) = ctx.config_str("notify") {
            // Notification fan-out is an external concern; record the intent.
            tracing::info!(
                execution_id = %ctx.execution_id,
                node = %ctx.node,
                target,
                "wait notification requested"
            );
        }

        match wait_type.as_str() {
            "timer" => Self::timer(&ctx, wait_type.clone()).await,
            _ => Self::signal(&ctx, wait_type.clone()).await,
        }
    }
}

impl WaitHandler {
    async fn timer(ctx: &HandlerContext, wait_type: String) -> Result<HandlerOutput, HandlerError> {
        let duration = ctx
            .config_value("durationMs")
            .or_else(|| ctx.config_value("timeoutMs"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                HandlerError::InvalidConfig("timer wait requires durationMs".into())
            })?;

        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(duration)) => {
                Ok(HandlerOutput::new(wait_output(wait_type, json!({"elapsed": true}))))
            }
            () = ctx.cancellation.cancelled() => {
                Ok(HandlerOutput::new(wait_output(wait_type, json!({"cancelled": true}))))
            }
        }
    }

    async fn signal(
        ctx: &HandlerContext,
        wait_type: String,
    ) -> Result<HandlerOutput, HandlerError> {
        let receiver = ctx
            .services
            .waits
            .register(ctx.execution_id, ctx.node.clone())
            .map_err(|e| HandlerError::Execution(e.to_string()))?;

        let timeout = ctx
            .config_value("timeoutMs")
            .and_then(Value::as_u64)
            .map(Duration::from_millis);

        let resolution = tokio::select! {
            payload = receiver => match payload {
                Ok(mut payload) => {
                    payload
                        .entry("timestamp".to_owned())
                        .or_insert_with(|| json!(Utc::now().to_rfc3339()));
                    Value::Object(payload)
                }
                // Sender dropped without a payload: the execution is being
                // torn down.
                Err(_) => json!({"cancelled": true}),
            },
            () = sleep_or_forever(timeout) => {
                ctx.services.waits.resolve_local(ctx.execution_id, &ctx.node);
                json!({"timedOut": true})
            }
            () = ctx.cancellation.cancelled() => {
                ctx.services.waits.resolve_local(ctx.execution_id, &ctx.node);
                json!({"cancelled": true})
            }
        };

        Ok(HandlerOutput::new(wait_output(wait_type, resolution)))
    }
}

/// Sleep for the duration, or forever when no timeout is configured.
async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

fn wait_output(wait_type: String, resolution: Value) -> Map<String, Value> {
    let mut output = match resolution {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_owned(), other);
            map
        }
    };
    output.insert("waitType".to_owned(), json!(wait_type));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::ctx;
    use cascade_workflow::NodeType;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn timer_wait_elapses() {
        let context = ctx(
            NodeType::Wait,
            json!({"waitType": "timer", "durationMs": 1000}),
        );
        let out = WaitHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("elapsed"), Some(&json!(true)));
        assert_eq!(out.output.get("waitType"), Some(&json!("timer")));
    }

    #[tokio::test]
    async fn timer_without_duration_is_config_error() {
        let context = ctx(NodeType::Wait, json!({"waitType": "timer"}));
        let err = WaitHandler.execute(context).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn signal_resolves_wait_with_payload() {
        let context = ctx(NodeType::Wait, json!({"waitType": "human-input"}));
        let waits = context.services.waits.clone();
        let execution_id = context.execution_id;
        let node = context.node.clone();

        let task = tokio::spawn(async move { WaitHandler.execute(context).await });

        // Deliver once the wait is registered.
        let mut payload = Map::new();
        payload.insert("decision".to_owned(), json!("approved"));
        payload.insert("approverId".to_owned(), json!("mgr"));
        loop {
            if waits.is_pending(execution_id, &node) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(waits.deliver(execution_id, &node, payload).delivered());

        let out = task.await.unwrap().unwrap();
        assert_eq!(out.output.get("decision"), Some(&json!("approved")));
        assert_eq!(out.output.get("approverId"), Some(&json!("mgr")));
        assert!(out.output.contains_key("timestamp"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_with_timed_out() {
        let context = ctx(
            NodeType::Wait,
            json!({"waitType": "human-input", "timeoutMs": 5000}),
        );
        let waits = context.services.waits.clone();
        let execution_id = context.execution_id;
        let node = context.node.clone();

        let out = WaitHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("timedOut"), Some(&json!(true)));

        // The wait is resolved: a late signal reports already-resolved.
        assert_eq!(
            waits.deliver(execution_id, &node, Map::new()),
            crate::wait::SignalDelivery::AlreadyResolved
        );
    }

    #[tokio::test]
    async fn cancellation_resolves_with_cancelled() {
        let context = ctx(NodeType::Wait, json!({"waitType": "event"}));
        context.cancellation.cancel();

        let out = WaitHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("cancelled"), Some(&json!(true)));
    }
}
