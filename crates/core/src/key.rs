//! Node keys — validated, user-authored node identifiers.
//!
//! Workflow authors name their nodes (`"FetchUser"`, `"Process_0"`, ...), and
//! those names double as the roots of interpolation paths
//! (`{{FetchUser.email}}`), so they are strings rather than UUIDs. [`NodeKey`]
//! validates them once at the boundary and is cheap to clone afterwards
//! (`Arc<str>` backed).

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

/// Maximum accepted key length in bytes.
const MAX_KEY_LEN: usize = 256;

/// A validated node identifier.
///
/// Valid keys are non-empty, at most 256 bytes, and contain no whitespace or
/// interpolation metacharacters (`{`, `}`, `[`, `]`, `.`). The dot and
/// bracket restrictions keep `{{Node.field[0]}}` paths unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeKey(Arc<str>);

impl NodeKey {
    /// Create a new key, validating the input.
    pub fn new(key: impl AsRef<str>) -> Result<Self, NodeKeyError> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(NodeKeyError::Empty);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(NodeKeyError::TooLong { len: key.len() });
        }
        if let Some(c) = key
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '.'))
        {
            return Err(NodeKeyError::InvalidCharacter { character: c });
        }
        Ok(Self(Arc::from(key)))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeKey {
    type Err = NodeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for NodeKey {
    type Error = NodeKeyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for NodeKey {
    type Error = NodeKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl Borrow<str> for NodeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validation failure when constructing a [`NodeKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeKeyError {
    /// The key was empty.
    #[error("node key must not be empty")]
    Empty,

    /// The key exceeded the maximum length.
    #[error("node key too long: {len} bytes (max {MAX_KEY_LEN})")]
    TooLong {
        /// The offending length in bytes.
        len: usize,
    },

    /// The key contained a forbidden character.
    #[error("node key contains forbidden character {character:?}")]
    InvalidCharacter {
        /// The first forbidden character encountered.
        character: char,
    },
}
