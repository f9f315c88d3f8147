#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Expression
//!
//! `{{ path }}` template interpolation over a flat execution-context view.
//!
//! The contract is deliberately small:
//!
//! - Paths are dot/index chains (`Node.field[0].name`) resolved against a
//!   JSON object.
//! - A missing path leaves the token **literal** in the output — callers can
//!   see exactly which reference did not resolve.
//! - Strings render raw; every other value renders as compact JSON.
//! - Interpolation never fails. Malformed tokens (an unclosed `{{`) render
//!   literally too.

pub mod path;
pub mod template;

pub use path::{Path, Segment, resolve_path};
pub use template::{Template, TemplatePart, interpolate, interpolate_value};
