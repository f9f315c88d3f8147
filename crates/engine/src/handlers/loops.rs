//! Loop controller and sentinel handlers.
//!
//! A loop is three cooperating nodes. The controller seeds the iteration
//! variables; the start sentinel marks the body entry; the end sentinel
//! decides whether to go around again. The scheduler owns the actual
//! reset-and-reenter mechanics and the max-iterations cap.

use async_trait::async_trait;
use cascade_expression::interpolate_value;
use serde_json::{Map, Value, json};

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};
use crate::handlers::conditional::{compare, truthy};

/// The loop controller: resolves the items to iterate and seeds the
/// iteration variables (`<var>`, `<var>_items`, `<var>_item`).
#[derive(Debug, Default)]
pub struct LoopHandler;

#[async_trait]
impl NodeHandler for LoopHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let Some(loop_ctx) = &ctx.loop_context else {
            return Err(HandlerError::InvalidConfig(format!(
                "loop node {} has no loop context",
                ctx.node
            )));
        };

        // Items come from the loop's iterate_over template or the config;
        // a condition-driven loop has neither.
        let items: Option<Vec<Value>> = match &loop_ctx.iterate_over {
            Some(template) => {
                let resolved = interpolate_value(
                    &Value::String(template.clone()),
                    &ctx.snapshot.execution_context(),
                );
                match resolved {
                    Value::Array(items) => Some(items),
                    Value::String(s) if s == *template => {
                        return Err(HandlerError::InvalidConfig(format!(
                            "iterate_over did not resolve: {template}"
                        )));
                    }
                    other => {
                        return Err(HandlerError::InvalidConfig(format!(
                            "iterate_over must resolve to an array, got {other}"
                        )));
                    }
                }
            }
            None => ctx
                .config_value("items")
                .and_then(Value::as_array)
                .cloned(),
        };

        let mut output = Map::new();
        output.insert("iteration".to_owned(), json!(0));
        let mut result = HandlerOutput::default().with_variable(&loop_ctx.iteration_variable, json!(0));
        if let Some(items) = items {
            output.insert("count".to_owned(), json!(items.len()));
            let first = items.first().cloned().unwrap_or(Value::Null);
            result = result
                .with_variable(loop_ctx.items_variable(), Value::Array(items))
                .with_variable(loop_ctx.item_variable(), first);
        }
        result.output = output;
        Ok(result)
    }
}

/// The body entry sentinel: a marker that reports the current iteration.
#[derive(Debug, Default)]
pub struct LoopStartHandler;

#[async_trait]
impl NodeHandler for LoopStartHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let iteration = ctx
            .loop_context
            .as_ref()
            .and_then(|c| ctx.snapshot.variable(&c.iteration_variable))
            .cloned()
            .unwrap_or(json!(0));
        let mut output = Map::new();
        output.insert("iteration".to_owned(), iteration);
        Ok(HandlerOutput::new(output))
    }
}

/// The body exit sentinel: decides `continueLoop`.
///
/// For foreach loops, iteration continues while items remain. An optional
/// early-exit condition stops it sooner — either
/// `{"exit": {"left", "operator", "right"}}` or `{"exit_when": <value>}`
/// (truthy after interpolation). The scheduler separately enforces
/// `max_iterations`.
#[derive(Debug, Default)]
pub struct LoopEndHandler;

#[async_trait]
impl NodeHandler for LoopEndHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        let Some(loop_ctx) = &ctx.loop_context else {
            return Err(HandlerError::InvalidConfig(format!(
                "loop-end node {} is not the end sentinel of any loop",
                ctx.node
            )));
        };

        let iteration = ctx
            .snapshot
            .variable(&loop_ctx.iteration_variable)
            .and_then(Value::as_u64)
            .unwrap_or(0);

        // More items to process?
        let mut continue_loop = ctx
            .snapshot
            .variable(&loop_ctx.items_variable())
            .and_then(Value::as_array)
            .map_or(true, |items| (iteration as usize + 1) < items.len());

        // Early exit wins over remaining items.
        if continue_loop && exit_requested(&ctx)? {
            continue_loop = false;
        }

        let mut output = Map::new();
        output.insert("continueLoop".to_owned(), json!(continue_loop));
        output.insert("iteration".to_owned(), json!(iteration));
        Ok(HandlerOutput::new(output))
    }
}

fn exit_requested(ctx: &HandlerContext) -> Result<bool, HandlerError> {
    if let Some(Value::Object(exit)) = ctx.config_value("exit") {
        let left = exit
            .get("left")
            .ok_or_else(|| HandlerError::InvalidConfig("exit missing left operand".into()))?;
        let operator = exit
            .get("operator")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::InvalidConfig("exit missing operator".into()))?;
        let right = exit.get("right").unwrap_or(&Value::Null);
        return compare(left, operator, right).map_err(HandlerError::InvalidConfig);
    }
    Ok(ctx.config_value("exit_when").is_some_and(truthy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::ctx_with_snapshot;
    use cascade_core::NodeKey;
    use cascade_execution::ContextSnapshot;
    use cascade_workflow::{LoopContext, NodeType};
    use pretty_assertions::assert_eq;

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn loop_ctx(iterate_over: Option<&str>) -> LoopContext {
        LoopContext {
            loop_node: key("Loop"),
            start_sentinel: key("Start"),
            end_sentinel: key("End"),
            body_nodes: vec![key("Start"), key("Process"), key("End")],
            iteration_variable: "i".into(),
            max_iterations: 10,
            iterate_over: iterate_over.map(ToOwned::to_owned),
        }
    }

    #[tokio::test]
    async fn controller_seeds_foreach_variables() {
        let snapshot = ContextSnapshot::new(
            json!({"items": ["apple", "banana", "cherry"]})
                .as_object()
                .unwrap()
                .clone(),
        );
        let mut context = ctx_with_snapshot(NodeType::Loop, json!({}), snapshot);
        context.loop_context = Some(loop_ctx(Some("{{items}}")));

        let out = LoopHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("count"), Some(&json!(3)));
        assert_eq!(out.set_variables.get("i"), Some(&json!(0)));
        assert_eq!(
            out.set_variables.get("i_items"),
            Some(&json!(["apple", "banana", "cherry"]))
        );
        assert_eq!(out.set_variables.get("i_item"), Some(&json!("apple")));
    }

    #[tokio::test]
    async fn controller_without_items_is_condition_driven() {
        let mut context =
            ctx_with_snapshot(NodeType::Loop, json!({}), ContextSnapshot::new(Map::new()));
        context.loop_context = Some(loop_ctx(None));

        let out = LoopHandler.execute(context).await.unwrap();
        assert_eq!(out.set_variables.get("i"), Some(&json!(0)));
        assert!(!out.set_variables.contains_key("i_items"));
    }

    #[tokio::test]
    async fn controller_rejects_unresolved_iterate_over() {
        let mut context =
            ctx_with_snapshot(NodeType::Loop, json!({}), ContextSnapshot::new(Map::new()));
        context.loop_context = Some(loop_ctx(Some("{{missing}}")));

        let err = LoopHandler.execute(context).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn controller_requires_loop_context() {
        let context =
            ctx_with_snapshot(NodeType::Loop, json!({}), ContextSnapshot::new(Map::new()));
        let err = LoopHandler.execute(context).await.unwrap_err();
        assert!(err.to_string().contains("no loop context"));
    }

    #[tokio::test]
    async fn start_reports_current_iteration() {
        let snapshot = ContextSnapshot::new(Map::new()).with_variable("i", json!(2));
        let mut context = ctx_with_snapshot(NodeType::LoopStart, json!({}), snapshot);
        context.loop_context = Some(loop_ctx(None));

        let out = LoopStartHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("iteration"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn end_continues_while_items_remain() {
        let snapshot = ContextSnapshot::new(Map::new())
            .with_variable("i", json!(0))
            .with_variable("i_items", json!(["a", "b", "c"]));
        let mut context = ctx_with_snapshot(NodeType::LoopEnd, json!({}), snapshot);
        context.loop_context = Some(loop_ctx(None));

        let out = LoopEndHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("continueLoop"), Some(&json!(true)));
        assert_eq!(out.output.get("iteration"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn end_stops_after_last_item() {
        let snapshot = ContextSnapshot::new(Map::new())
            .with_variable("i", json!(2))
            .with_variable("i_items", json!(["a", "b", "c"]));
        let mut context = ctx_with_snapshot(NodeType::LoopEnd, json!({}), snapshot);
        context.loop_context = Some(loop_ctx(None));

        let out = LoopEndHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("continueLoop"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn exit_condition_stops_early() {
        let snapshot = ContextSnapshot::new(Map::new())
            .with_variable("i", json!(1))
            .with_variable("i_items", json!([1, 2, 3, 4, 5]));
        // After interpolation "{{sum}}" arrived as 60.
        let mut context = ctx_with_snapshot(
            NodeType::LoopEnd,
            json!({"exit": {"left": 60, "operator": ">=", "right": 50}}),
            snapshot,
        );
        context.loop_context = Some(loop_ctx(None));

        let out = LoopEndHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("continueLoop"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn exit_when_truthy_stops() {
        let snapshot = ContextSnapshot::new(Map::new())
            .with_variable("i", json!(0))
            .with_variable("i_items", json!([1, 2, 3]));
        let mut context =
            ctx_with_snapshot(NodeType::LoopEnd, json!({"exit_when": true}), snapshot);
        context.loop_context = Some(loop_ctx(None));

        let out = LoopEndHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("continueLoop"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn condition_loop_continues_until_exit() {
        let snapshot = ContextSnapshot::new(Map::new()).with_variable("i", json!(4));
        let mut context = ctx_with_snapshot(NodeType::LoopEnd, json!({}), snapshot);
        context.loop_context = Some(loop_ctx(None));

        let out = LoopEndHandler.execute(context).await.unwrap();
        assert_eq!(out.output.get("continueLoop"), Some(&json!(true)));
    }
}
