//! The conditional handler: branch selection.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::handler::{HandlerContext, HandlerError, HandlerOutput, NodeHandler};

/// Selects an outgoing branch.
///
/// Two config shapes:
///
/// - `{"left": <value>, "operator": <op>, "right": <value>}` — a boolean
///   test; the output selects the `"true"` or `"false"` handle.
/// - `{"branch": <value>}` — a multi-way switch; the stringified value is
///   the selected handle key.
///
/// Output shape: `{"result": <bool>, "selectedBranch": <handle>}`. The
/// queue skips the siblings of the selected branch.
#[derive(Debug, Default)]
pub struct ConditionalHandler;

#[async_trait]
impl NodeHandler for ConditionalHandler {
    async fn execute(&self, ctx: HandlerContext) -> Result<HandlerOutput, HandlerError> {
        if let Some(branch) = ctx.config_value("branch") {
            let selected = match branch {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let mut output = Map::new();
            output.insert("selectedBranch".to_owned(), json!(selected));
            return Ok(HandlerOutput::new(output));
        }

        let left = ctx
            .config_value("left")
            .ok_or_else(|| HandlerError::InvalidConfig("missing left operand".into()))?;
        let operator = ctx
            .config_str("operator")
            .ok_or_else(|| HandlerError::InvalidConfig("missing operator".into()))?;
        let right = ctx.config_value("right").unwrap_or(&Value::Null);

        let result = compare(left, operator, right)
            .map_err(HandlerError::InvalidConfig)?;

        let mut output = Map::new();
        output.insert("result".to_owned(), json!(result));
        output.insert(
            "selectedBranch".to_owned(),
            json!(if result { "true" } else { "false" }),
        );
        Ok(HandlerOutput::new(output))
    }
}

/// Evaluate `left <operator> right`.
///
/// Numbers compare numerically; everything else compares structurally for
/// `eq`/`ne` and lexically for the orderings. `contains` checks substring
/// or array membership; `truthy` ignores `right`.
pub(crate) fn compare(left: &Value, operator: &str, right: &Value) -> Result<bool, String> {
    match operator {
        "eq" | "==" => Ok(loose_eq(left, right)),
        "ne" | "!=" => Ok(!loose_eq(left, right)),
        "gt" | ">" => ordering(left, right).map(|o| o == std::cmp::Ordering::Greater),
        "gte" | ">=" => ordering(left, right).map(|o| o != std::cmp::Ordering::Less),
        "lt" | "<" => ordering(left, right).map(|o| o == std::cmp::Ordering::Less),
        "lte" | "<=" => ordering(left, right).map(|o| o != std::cmp::Ordering::Greater),
        "contains" => contains(left, right),
        "truthy" => Ok(truthy(left)),
        other => Err(format!("unknown operator: {other}")),
    }
}

/// Equality across the string/number seam interpolation introduces:
/// `"5" == 5` holds.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => (l - r).abs() < f64::EPSILON,
        _ => false,
    }
}

fn ordering(left: &Value, right: &Value) -> Result<std::cmp::Ordering, String> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l
            .partial_cmp(&r)
            .ok_or_else(|| "numeric comparison with NaN".to_owned());
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => Err(format!("cannot order {left} against {right}")),
    }
}

fn contains(left: &Value, right: &Value) -> Result<bool, String> {
    match left {
        Value::String(haystack) => {
            let needle = match right {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(haystack.contains(&needle))
        }
        Value::Array(items) => Ok(items.contains(right)),
        _ => Err(format!("contains not applicable to {left}")),
    }
}

/// Numbers parse out of strings so `"15" > 10` works after interpolation.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON truthiness: null, false, 0, "", "false", empty array/object are
/// falsy.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
