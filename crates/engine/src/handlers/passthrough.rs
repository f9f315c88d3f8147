//! Input, output, and code handlers.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};

/// The trigger node: exposes the workflow inputs as its output.
#[derive(Debug, Default)]
pub struct InputHandler;

#[async_trait]
impl NodeHandler for InputHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        Ok(HandlerOutput::new(ctx.snapshot.inputs().clone()))
    }
}

/// A terminal node: its output feeds the workflow's final outputs.
///
/// With a `mapping` object in the config, the (already interpolated)
/// mapping becomes the output. Without one, the outputs of the node's
/// dependencies are merged left-to-right in graph order.
#[derive(Debug, Default)]
pub struct OutputHandler;

#[async_trait]
impl NodeHandler for OutputHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        if let Some(Value::Object(mapping)) = ctx.config_value("mapping") {
            return Ok(HandlerOutput::new(mapping.clone()));
        }
        let mut merged = Map::new();
        for dependency in &ctx.dependencies {
            if let Some(output) = ctx.snapshot.node_output(dependency) {
                for (key, value) in output {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(HandlerOutput::new(merged))
    }
}

/// An opaque code block. Nodes are opaque callables to the engine; the
/// built-in stands in by emitting the (interpolated) `output` object from
/// its config.
#[derive(Debug, Default)]
pub struct CodeHandler;

#[async_trait]
impl NodeHandler for CodeHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        match ctx.config_value("output") {
            Some(Value::Object(output)) => Ok(HandlerOutput::new(output.clone())),
            Some(other) => Ok(HandlerOutput::from_value(other.clone())),
            None => Ok(HandlerOutput::default()),
        }
    }
}
