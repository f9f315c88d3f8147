//! The transform handler: pure data reshaping.

use async_trait::async_trait;
use serde_json::Value;

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};

/// Reshapes upstream data through interpolated assignments.
///
/// Config: `{"assignments": {<key>: <template-or-value>, ...}}`. The
/// scheduler interpolates the config before dispatch, so by the time the
/// handler runs the assignments are resolved values; they become the
/// node's output verbatim. `{"variables": {...}}` additionally writes
/// workflow variables.
#[derive(Debug, Default)]
pub struct TransformHandler;

#[async_trait]
impl NodeHandler for TransformHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let output = match ctx.config_value("assignments") {
            Some(Value::Object(assignments)) => assignments.clone(),
            Some(other) => {
                return Err(HandlerError::InvalidConfig(format!(
                    "assignments must be an object, got {other}"
                )));
            }
            None => serde_json::Map::new(),
        };

        let mut result = HandlerOutput::new(output);
        if let Some(Value::Object(variables)) = ctx.config_value("variables") {
            for (name, value) in variables {
                result = result.with_variable(name, value.clone());
            }
        }
        Ok(result)
    }
}
