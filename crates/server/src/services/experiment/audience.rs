//! Audience condition evaluation.
//!
//! Condition trees are nested JSON arrays whose first element may be an
//! operator (`and`, `or`, `not`; `or` when omitted) followed by operands.
//! Leaves are `custom_attribute` objects matched against the user's
//! attributes. Only string attributes are supported, which covers the
//! `country` audience the store targets.

use std::collections::BTreeMap;

use serde_json::Value;

use super::datafile::{Datafile, Experiment};

/// User attributes passed to a decision.
pub type Attributes = BTreeMap<String, String>;

/// Whether the user qualifies for `experiment`.
///
/// An experiment without audiences admits everyone; otherwise any one
/// matching audience is enough. Unknown audience ids never match.
#[must_use]
pub fn qualifies(datafile: &Datafile, experiment: &Experiment, attributes: &Attributes) -> bool {
    if experiment.audience_ids.is_empty() {
        return true;
    }

    experiment.audience_ids.iter().any(|id| {
        datafile
            .audience(id)
            .is_some_and(|audience| evaluate(&audience.conditions, attributes))
    })
}

/// Evaluate a condition tree.
#[must_use]
pub fn evaluate(conditions: &Value, attributes: &Attributes) -> bool {
    match conditions {
        // Legacy audiences embed the tree as a JSON string.
        Value::String(text) => serde_json::from_str::<Value>(text)
            .is_ok_and(|tree| !tree.is_string() && evaluate(&tree, attributes)),
        Value::Array(items) => evaluate_list(items, attributes),
        Value::Object(_) => evaluate_leaf(conditions, attributes),
        _ => false,
    }
}

fn evaluate_list(items: &[Value], attributes: &Attributes) -> bool {
    let (operator, operands) = match items.split_first() {
        Some((Value::String(op), rest)) if matches!(op.as_str(), "and" | "or" | "not") => {
            (op.as_str(), rest)
        }
        _ => ("or", items),
    };

    match operator {
        "and" => !operands.is_empty() && operands.iter().all(|c| evaluate(c, attributes)),
        "not" => operands.first().is_some_and(|c| !evaluate(c, attributes)),
        _ => operands.iter().any(|c| evaluate(c, attributes)),
    }
}

fn evaluate_leaf(leaf: &Value, attributes: &Attributes) -> bool {
    if leaf.get("type").and_then(Value::as_str) != Some("custom_attribute") {
        return false;
    }
    let Some(name) = leaf.get("name").and_then(Value::as_str) else {
        return false;
    };
    let actual = attributes.get(name);
    let expected = leaf.get("value").and_then(Value::as_str);

    match leaf.get("match").and_then(Value::as_str).unwrap_or("exact") {
        "exists" => actual.is_some(),
        "exact" => matches!((actual, expected), (Some(a), Some(e)) if a == e),
        "substring" => matches!((actual, expected), (Some(a), Some(e)) if a.contains(e)),
        _ => false,
    }
}
