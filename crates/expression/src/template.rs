//! Template parsing and rendering.

use serde_json::Value;

use crate::path::{Path, resolve_path};

/// A template part — either static text or a `{{ path }}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Text copied through verbatim.
    Static(String),
    /// A reference token.
    Expression {
        /// The full token including braces, rendered literally when the
        /// path is missing or malformed.
        raw: String,
        /// The parsed path; `None` when the token body does not parse.
        path: Option<Path>,
    },
}

/// A parsed template, reusable across renders.
#[derive(Debug, Clone)]
pub struct Template {
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Parse a template. Parsing never fails: an unclosed `{{` is treated
    /// as static text.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break; // unclosed token: the remainder is static
            };
            if open > 0 {
                parts.push(TemplatePart::Static(rest[..open].to_owned()));
            }
            let body = &rest[open + 2..open + 2 + close];
            let raw = rest[open..open + 2 + close + 2].to_owned();
            parts.push(TemplatePart::Expression {
                raw,
                path: Path::parse(body),
            });
            rest = &rest[open + 2 + close + 2..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Static(rest.to_owned()));
        }

        Self { parts }
    }

    /// The parsed parts.
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Returns `true` if the template contains any reference tokens.
    #[must_use]
    pub fn has_expressions(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, TemplatePart::Expression { .. }))
    }

    /// Render against a context object. Missing references stay literal.
    #[must_use]
    pub fn render(&self, context: &Value) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Static(text) => out.push_str(text),
                TemplatePart::Expression { raw, path } => {
                    match path.as_ref().and_then(|p| resolve_path(context, p)) {
                        Some(value) => out.push_str(&render_value(value)),
                        None => out.push_str(raw),
                    }
                }
            }
        }
        out
    }

    /// If the template is exactly one reference token (ignoring surrounding
    /// whitespace), return its path. Used to pass arrays and objects through
    /// config values without stringification.
    #[must_use]
    pub fn sole_expression(&self) -> Option<&Path> {
        let mut path = None;
        for part in &self.parts {
            match part {
                TemplatePart::Static(text) if text.trim().is_empty() => {}
                TemplatePart::Expression { path: Some(p), .. } if path.is_none() => {
                    path = Some(p);
                }
                _ => return None,
            }
        }
        path
    }
}

/// Strings render raw; everything else renders as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render `template` against `context` in one call.
#[must_use]
pub fn interpolate(template: &str, context: &Value) -> String {
    Template::parse(template).render(context)
}

/// Deep-interpolate every string leaf of a JSON value.
///
/// A string that is exactly one `{{ path }}` token resolves to the
/// referenced value itself (arrays and objects pass through untouched);
/// any other string renders as text. Missing references stay literal
/// either way.
#[must_use]
pub fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => {
            let template = Template::parse(s);
            if let Some(path) = template.sole_expression() {
                if let Some(resolved) = resolve_path(context, path) {
                    return resolved.clone();
                }
            }
            Value::String(template.render(context))
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn static_only_template() {
        let t = Template::parse("Hello, World!");
        assert!(!t.has_expressions());
        assert_eq!(t.render(&json!({})), "Hello, World!");
    }

    #[test]
    fn renders_string_reference_raw() {
        let ctx = json!({"name": "Ada"});
        assert_eq!(interpolate("Hello {{name}}!", &ctx), "Hello Ada!");
    }

    #[test]
    fn renders_nested_path() {
        let ctx = json!({"A": {"b": {"c": "deep"}}});
        assert_eq!(interpolate("{{A.b.c}}", &ctx), "deep");
    }

    #[test]
    fn renders_scalars_as_json() {
        let ctx = json!({"n": 42, "f": 1.5, "b": true, "z": null});
        assert_eq!(interpolate("{{n}}/{{f}}/{{b}}/{{z}}", &ctx), "42/1.5/true/null");
    }

    #[test]
    fn renders_arrays_and_objects_compact() {
        let ctx = json!({"items": [1, 2], "obj": {"a": 1}});
        assert_eq!(interpolate("{{items}}", &ctx), "[1,2]");
        assert_eq!(interpolate("{{obj}}", &ctx), r#"{"a":1}"#);
    }

    #[test]
    fn missing_path_stays_literal() {
        let ctx = json!({"a": 1});
        assert_eq!(interpolate("{{missingVar}}", &ctx), "{{missingVar}}");
        assert_eq!(
            interpolate("x {{a.b.c}} y", &ctx),
            "x {{a.b.c}} y"
        );
    }

    #[test]
    fn missing_token_preserves_inner_whitespace() {
        let ctx = json!({});
        assert_eq!(interpolate("{{ gone }}", &ctx), "{{ gone }}");
    }

    #[test]
    fn malformed_path_stays_literal() {
        let ctx = json!({"a": [1]});
        assert_eq!(interpolate("{{a[x]}}", &ctx), "{{a[x]}}");
        assert_eq!(interpolate("{{}}", &ctx), "{{}}");
    }

    #[test]
    fn unclosed_token_is_static() {
        let ctx = json!({"a": 1});
        assert_eq!(interpolate("Hello {{a", &ctx), "Hello {{a");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let ctx = json!({"path": {"to": {"value": "v"}}});
        assert_eq!(interpolate("{{ path.to.value }}", &ctx), "v");
    }

    #[test]
    fn multiple_references_in_one_template() {
        let ctx = json!({"a": "x", "b": "y"});
        assert_eq!(interpolate("{{a}}-{{b}}-{{a}}", &ctx), "x-y-x");
    }

    #[test]
    fn indexed_reference() {
        let ctx = json!({"items": ["apple", "banana"]});
        assert_eq!(interpolate("got {{items[1]}}", &ctx), "got banana");
    }

    #[rstest]
    #[case("{{a.b.c}}", json!({"a": {"b": {"c": 7}}}), "7")]
    #[case("{{a.b.c}}", json!({"a": {"b": {}}}), "{{a.b.c}}")]
    #[case("{{a.b.c}}", json!({}), "{{a.b.c}}")]
    fn interpolation_fidelity(#[case] template: &str, #[case] ctx: Value, #[case] expected: &str) {
        assert_eq!(interpolate(template, &ctx), expected);
    }

    // ── interpolate_value ───────────────────────────────────────────

    #[test]
    fn sole_expression_passes_value_through() {
        let ctx = json!({"items": ["a", "b"]});
        let config = json!({"iterate": "{{items}}"});
        let out = interpolate_value(&config, &ctx);
        assert_eq!(out, json!({"iterate": ["a", "b"]}));
    }

    #[test]
    fn sole_expression_with_padding_passes_through() {
        let ctx = json!({"n": 42});
        let out = interpolate_value(&json!("  {{n}}  "), &ctx);
        assert_eq!(out, json!(42));
    }

    #[test]
    fn mixed_string_renders_as_text() {
        let ctx = json!({"n": 42});
        let out = interpolate_value(&json!("n={{n}}"), &ctx);
        assert_eq!(out, json!("n=42"));
    }

    #[test]
    fn deep_walk_covers_arrays_and_objects() {
        let ctx = json!({"user": {"name": "Ada"}});
        let config = json!({
            "greeting": "hi {{user.name}}",
            "nested": {"copy": "{{user}}"},
            "list": ["{{user.name}}", 1, true]
        });
        let out = interpolate_value(&config, &ctx);
        assert_eq!(
            out,
            json!({
                "greeting": "hi Ada",
                "nested": {"copy": {"name": "Ada"}},
                "list": ["Ada", 1, true]
            })
        );
    }

    #[test]
    fn missing_sole_expression_stays_literal_string() {
        let ctx = json!({});
        let out = interpolate_value(&json!("{{gone}}"), &ctx);
        assert_eq!(out, json!("{{gone}}"));
    }

    #[test]
    fn non_string_scalars_untouched() {
        let ctx = json!({});
        assert_eq!(interpolate_value(&json!(7), &ctx), json!(7));
        assert_eq!(interpolate_value(&json!(null), &ctx), json!(null));
    }
}
