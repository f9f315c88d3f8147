//! Built-in handlers for the core node types.
//!
//! Every type in the closed set has a handler here. The external-service
//! handlers (llm, http, integration) ship as transport-pluggable shells:
//! the retry/backoff policy and output shaping live in the engine, the
//! actual client is injected.

pub mod conditional;
pub mod external;
pub mod loops;
pub mod passthrough;
pub mod transform;
pub mod wait;

use crate::registry::HandlerRegistry;
use cascade_workflow::NodeType;
use std::sync::Arc;

pub use conditional::ConditionalHandler;
pub use external::{HttpHandler, IntegrationHandler, LlmHandler, Transport, TransportError};
pub use loops::{LoopEndHandler, LoopHandler, LoopStartHandler};
pub use passthrough::{CodeHandler, InputHandler, OutputHandler};
pub use transform::TransformHandler;
pub use wait::WaitHandler;

/// Register every built-in handler. External-service handlers start as
/// stubs; callers wire transports by re-registering.
pub fn register_builtins(registry: &mut HandlerRegistry) {
    registry.register(NodeType::Input, Arc::new(InputHandler));
    registry.register(NodeType::Output, Arc::new(OutputHandler));
    registry.register(NodeType::Code, Arc::new(CodeHandler));
    registry.register(NodeType::Transform, Arc::new(TransformHandler));
    registry.register(NodeType::Conditional, Arc::new(ConditionalHandler));
    registry.register(NodeType::Loop, Arc::new(LoopHandler));
    registry.register(NodeType::LoopStart, Arc::new(LoopStartHandler));
    registry.register(NodeType::LoopEnd, Arc::new(LoopEndHandler));
    registry.register(NodeType::Wait, Arc::new(WaitHandler));
    registry.register(NodeType::Llm, Arc::new(LlmHandler::stub()));
    registry.register(NodeType::Http, Arc::new(HttpHandler::stub()));
    registry.register(NodeType::Integration, Arc::new(IntegrationHandler::stub()));
}

/// A registry pre-populated with the built-ins.
#[must_use]
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_builtins(&mut registry);
    registry
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for handler unit tests.

    use std::sync::Arc;

    use cascade_core::{ExecutionId, NodeKey, WorkflowId};
    use cascade_eventbus::EventBus;
    use cascade_execution::ContextSnapshot;
    use cascade_workflow::NodeType;
    use serde_json::{Map, Value};
    use tokio_util::sync::CancellationToken;

    use crate::handler::{HandlerContext, HandlerServices};
    use crate::wait::WaitCoordinator;

    /// A context over an empty snapshot with the given config.
    pub(crate) fn ctx(node_type: NodeType, config: Value) -> HandlerContext {
        ctx_with_snapshot(node_type, config, ContextSnapshot::new(Map::new()))
    }

    /// A context over a caller-supplied snapshot.
    pub(crate) fn ctx_with_snapshot(
        node_type: NodeType,
        config: Value,
        snapshot: ContextSnapshot,
    ) -> HandlerContext {
        HandlerContext {
            execution_id: ExecutionId::v4(),
            workflow_id: WorkflowId::v4(),
            node: NodeKey::new("UnderTest").unwrap(),
            node_type,
            config: config.as_object().cloned().unwrap_or_default(),
            snapshot,
            dependencies: Vec::new(),
            loop_context: None,
            cancellation: CancellationToken::new(),
            services: HandlerServices {
                bus: Arc::new(EventBus::default()),
                waits: Arc::new(WaitCoordinator::new()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_every_node_type() {
        let registry = builtin_registry();
        for node_type in [
            NodeType::Input,
            NodeType::Output,
            NodeType::Transform,
            NodeType::Conditional,
            NodeType::Llm,
            NodeType::Http,
            NodeType::Code,
            NodeType::Loop,
            NodeType::LoopStart,
            NodeType::LoopEnd,
            NodeType::Wait,
            NodeType::Integration,
        ] {
            assert!(
                registry.get(node_type).is_some(),
                "missing builtin for {node_type}"
            );
        }
    }
}
