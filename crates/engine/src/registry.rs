//! The handler registry: a dispatch table keyed by node type.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use cascade_workflow::{BuiltWorkflow, NodeType};

use crate::error::EngineError;
use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerOutput, HandlerError>> + Send>>;

/// Registered handlers, looked up by [`NodeType`].
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a node type, replacing any previous one.
    pub fn register(&mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type, handler);
    }

    /// Register an async closure as a handler. Handy in tests and for
    /// one-off integrations.
    pub fn register_fn<F, Fut>(&mut self, node_type: NodeType, f: F)
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput, HandlerError>> + Send + 'static,
    {
        self.register(node_type, Arc::new(FnHandler::new(f)));
    }

    /// Look up the handler for a node type.
    #[must_use]
    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type).cloned()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Fail fast when any node in the workflow has no handler. Runs at
    /// build time, before anything executes.
    pub fn validate_coverage(&self, workflow: &BuiltWorkflow) -> Result<(), EngineError> {
        for node in workflow.nodes() {
            let node_type = node.node_type();
            if !self.handlers.contains_key(&node_type) {
                return Err(EngineError::HandlerMissing { node_type });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&NodeType> = self.handlers.keys().collect();
        types.sort_by_key(|t| t.as_str());
        f.debug_struct("HandlerRegistry")
            .field("types", &types)
            .finish()
    }
}

/// Adapts an async closure to [`NodeHandler`].
pub struct FnHandler {
    f: Box<dyn Fn(HandlerContext) -> BoxedHandlerFuture + Send + Sync>,
}

impl FnHandler {
    /// Wrap the closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput, HandlerError>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

#[async_trait]
impl NodeHandler for FnHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        (self.f)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::NodeKey;
    use cascade_workflow::{EdgeDefinition, NodeDefinition, WorkflowDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    fn sample_workflow() -> BuiltWorkflow {
        BuiltWorkflow::build(
            WorkflowDefinition::new("sample", key("A"))
                .with_node(NodeDefinition::new(key("A"), NodeType::Input))
                .with_node(NodeDefinition::new(key("B"), NodeType::Llm))
                .with_edge(EdgeDefinition::new(key("A"), key("B"))),
        )
        .unwrap()
    }

    #[test]
    fn register_and_get() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        registry.register_fn(NodeType::Input, |_ctx| async {
            Ok(HandlerOutput::from_value(json!({"ok": true})))
        });
        assert_eq!(registry.len(), 1);
        assert!(registry.get(NodeType::Input).is_some());
        assert!(registry.get(NodeType::Llm).is_none());
    }

    #[test]
    fn validate_coverage_reports_missing_type() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(NodeType::Input, |_ctx| async {
            Ok(HandlerOutput::default())
        });

        let err = registry.validate_coverage(&sample_workflow()).unwrap_err();
        assert!(err.to_string().contains("llm"));
    }

    #[test]
    fn validate_coverage_passes_when_complete() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(NodeType::Input, |_ctx| async {
            Ok(HandlerOutput::default())
        });
        registry.register_fn(NodeType::Llm, |_ctx| async { Ok(HandlerOutput::default()) });
        assert!(registry.validate_coverage(&sample_workflow()).is_ok());
    }

    #[test]
    fn replacing_a_handler_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn(NodeType::Code, |_ctx| async {
            Ok(HandlerOutput::from_value(json!({"v": 1})))
        });
        registry.register_fn(NodeType::Code, |_ctx| async {
            Ok(HandlerOutput::from_value(json!({"v": 2})))
        });
        assert_eq!(registry.len(), 1);
    }
}
