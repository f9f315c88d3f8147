//! Edge handle tags.
//!
//! A handle names the output port an edge leaves its source node through.
//! Conditional nodes route via `true`/`false` (or custom multi-way keys);
//! loops use the `loop-*` family. Everything else uses `default`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The handle an edge is attached to on its source node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HandleType {
    /// Plain data edge, always live once the source completes.
    Default,
    /// Live when a conditional source selects its `true` branch.
    True,
    /// Live when a conditional source selects its `false` branch.
    False,
    /// Loop node → first body node.
    LoopBody,
    /// Loop end → loop start, requesting another iteration. Control only —
    /// never a data dependency.
    LoopBack,
    /// Loop end → downstream, live once the loop stops iterating.
    LoopExit,
    /// Loop node → downstream, live once the loop has fully completed.
    LoopComplete,
    /// Custom multi-way branch key (e.g. `"case_2"`).
    Custom(String),
}

impl HandleType {
    /// The canonical string form of this handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::True => "true",
            Self::False => "false",
            Self::LoopBody => "loop-body",
            Self::LoopBack => "loop-back",
            Self::LoopExit => "loop-exit",
            Self::LoopComplete => "loop-complete",
            Self::Custom(s) => s,
        }
    }

    /// Returns `true` for handles whose liveness depends on the source
    /// node's branch selection (`true`/`false`/custom).
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::True | Self::False | Self::Custom(_))
    }

    /// Returns `true` for the loop control family.
    #[must_use]
    pub fn is_loop_control(&self) -> bool {
        matches!(
            self,
            Self::LoopBody | Self::LoopBack | Self::LoopExit | Self::LoopComplete
        )
    }
}

impl Default for HandleType {
    fn default() -> Self {
        Self::Default
    }
}

impl From<String> for HandleType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "default" | "" => Self::Default,
            "true" => Self::True,
            "false" => Self::False,
            "loop-body" => Self::LoopBody,
            "loop-back" => Self::LoopBack,
            "loop-exit" => Self::LoopExit,
            "loop-complete" => Self::LoopComplete,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for HandleType {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<HandleType> for String {
    fn from(h: HandleType) -> Self {
        h.as_str().to_owned()
    }
}

impl fmt::Display for HandleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
