//! Node definitions.

use cascade_core::NodeKey;
use serde::{Deserialize, Serialize};

/// The closed set of node types the engine can dispatch.
///
/// Each type maps to a registered handler; the `config` payload is opaque to
/// the graph layer and interpreted by that handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    /// Entry node — exposes the workflow inputs.
    Input,
    /// Terminal node — contributes to the final outputs.
    Output,
    /// Pure data reshaping via interpolated assignments.
    Transform,
    /// Branch selection (`true`/`false` or multi-way).
    Conditional,
    /// Large-language-model call.
    Llm,
    /// Outbound HTTP request.
    Http,
    /// User-supplied code block (opaque callable).
    Code,
    /// Loop controller (for / foreach).
    Loop,
    /// Sentinel marking the first node of a loop body.
    LoopStart,
    /// Sentinel marking the last node of a loop body; decides iteration.
    LoopEnd,
    /// Suspends until a signal, timer, or cancellation.
    Wait,
    /// Third-party integration call.
    Integration,
}

impl NodeType {
    /// The canonical string tag (matches the serde form).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Transform => "transform",
            Self::Conditional => "conditional",
            Self::Llm => "llm",
            Self::Http => "http",
            Self::Code => "code",
            Self::Loop => "loop",
            Self::LoopStart => "loop-start",
            Self::LoopEnd => "loop-end",
            Self::Wait => "wait",
            Self::Integration => "integration",
        }
    }

    /// Returns `true` for the loop controller and its sentinels.
    #[must_use]
    pub fn is_loop_family(&self) -> bool {
        matches!(self, Self::Loop | Self::LoopStart | Self::LoopEnd)
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the scheduler does when a node's handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Fail the node and cascade downstream (the default).
    #[default]
    Cascade,
    /// Record `{error: true, message}` as the node's output and keep going.
    Continue,
}

/// A single node in the authoring format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique, user-authored identifier. Doubles as the interpolation root
    /// for this node's output (`{{<id>.field}}`).
    pub id: NodeKey,
    /// Which handler executes this node.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Human-readable label; defaults to the id.
    #[serde(default)]
    pub name: String,
    /// Opaque handler configuration. String leaves may contain `{{...}}`
    /// templates, interpolated at dispatch time.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    /// Failure behavior for this node.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl NodeDefinition {
    /// Create a node with an empty config.
    pub fn new(id: NodeKey, node_type: NodeType) -> Self {
        let name = id.to_string();
        Self {
            id,
            node_type,
            name,
            config: serde_json::Map::new(),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Set the config payload.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Map<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Set the error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(s: &str) -> NodeKey {
        NodeKey::new(s).unwrap()
    }

    #[test]
    fn node_type_serde_kebab_case() {
        assert_eq!(
            serde_json::to_string(&NodeType::LoopStart).unwrap(),
            "\"loop-start\""
        );
        let back: NodeType = serde_json::from_str("\"loop-end\"").unwrap();
        assert_eq!(back, NodeType::LoopEnd);
    }

    #[test]
    fn node_type_as_str_matches_serde() {
        for nt in [
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
            let json = serde_json::to_string(&nt).unwrap();
            assert_eq!(json, format!("\"{}\"", nt.as_str()));
        }
    }

    #[test]
    fn loop_family_classification() {
        assert!(NodeType::Loop.is_loop_family());
        assert!(NodeType::LoopStart.is_loop_family());
        assert!(NodeType::LoopEnd.is_loop_family());
        assert!(!NodeType::Conditional.is_loop_family());
    }

    #[test]
    fn error_policy_defaults_to_cascade() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::Cascade);
    }

    #[test]
    fn node_definition_deserializes_minimal_form() {
        let node: NodeDefinition =
            serde_json::from_str(r#"{"id": "A", "type": "transform"}"#).unwrap();
        assert_eq!(node.id, key("A"));
        assert_eq!(node.node_type, NodeType::Transform);
        assert!(node.config.is_empty());
        assert_eq!(node.error_policy, ErrorPolicy::Cascade);
    }

    #[test]
    fn node_definition_deserializes_error_policy() {
        let node: NodeDefinition = serde_json::from_str(
            r#"{"id": "A", "type": "http", "error_policy": "continue"}"#,
        )
        .unwrap();
        assert_eq!(node.error_policy, ErrorPolicy::Continue);
    }

    #[test]
    fn new_uses_id_as_name() {
        let node = NodeDefinition::new(key("Fetch"), NodeType::Http);
        assert_eq!(node.name, "Fetch");
    }
}
