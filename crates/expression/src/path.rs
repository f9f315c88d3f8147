//! Dot/index path parsing and resolution.

use serde_json::Value;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// An object key (`user`).
    Key(String),
    /// An array index (`[2]`).
    Index(usize),
}

/// A parsed reference path: `A.b.c[0].d`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Parse a path expression. Returns `None` on empty input or malformed
    /// syntax (unbalanced brackets, non-numeric index, empty segment) —
    /// callers render the token literally in that case.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let mut segments = Vec::new();
        for part in input.split('.') {
            if part.is_empty() {
                return None;
            }
            let mut rest = part;
            // Leading identifier, if any ("items" in "items[0][1]").
            if let Some(bracket) = rest.find('[') {
                if bracket > 0 {
                    segments.push(Segment::Key(rest[..bracket].to_owned()));
                }
                rest = &rest[bracket..];
            } else {
                if rest.contains(']') {
                    return None;
                }
                segments.push(Segment::Key(rest.to_owned()));
                continue;
            }
            // Remaining bracketed indices.
            while !rest.is_empty() {
                if !rest.starts_with('[') {
                    return None;
                }
                let close = rest.find(']')?;
                let index: usize = rest[1..close].parse().ok()?;
                segments.push(Segment::Index(index));
                rest = &rest[close + 1..];
            }
        }

        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Walk `root` along `path`. Returns `None` as soon as any segment is
/// missing or the value shape does not match the segment kind.
#[must_use]
pub fn resolve_path<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = root;
    for segment in &path.segments {
        current = match segment {
            Segment::Key(key) => current.as_object()?.get(key)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}
