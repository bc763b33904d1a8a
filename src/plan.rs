//! Generic planning driven by a resource [`Schema`].
//!
//! The planned state starts from the proposed (configuration-derived) state:
//!
//! - null optional attributes receive their schema default;
//! - computed attributes the configuration leaves null keep their prior
//!   value, or become unknown on create and replacement;
//! - a change to any force-new attribute requires replacement.
//!
//! Values are compared through the schema: set attributes and set blocks
//! match regardless of element order.

use serde_json::{Map, Value};

use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, NestedBlock, Schema};
use crate::types::{AttributeChange, PlanResult};
use crate::value::{is_unknown, unknown};

/// Plan a resource change.
///
/// `prior` is `None` on create. A null `proposed` plans a destroy.
pub fn plan_resource(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior_map = prior.and_then(Value::as_object);

    if proposed.is_null() {
        return plan_destroy(prior_map);
    }

    let mut planned = proposed.as_object().cloned().unwrap_or_default();
    let mut attributes: Vec<(&String, &Attribute)> = schema.block.attributes.iter().collect();
    attributes.sort_by_key(|(name, _)| *name);

    for (name, attr) in &attributes {
        if is_null_or_absent(planned.get(name.as_str())) && !attr.flags.required {
            if let Some(default) = &attr.default {
                planned.insert(name.to_string(), default.clone());
            }
        }
    }

    let requires_replace = match prior_map {
        Some(prior) => attributes
            .iter()
            .filter(|(_, attr)| attr.force_new)
            .any(|(name, attr)| {
                let after = planned.get(name.as_str()).unwrap_or(&Value::Null);
                let before = prior.get(name.as_str()).unwrap_or(&Value::Null);
                !is_unknown(after) && !same_attribute(&attr.attr_type, after, before)
            }),
        None => false,
    };

    for (name, attr) in &attributes {
        if !attr.flags.computed || !is_null_or_absent(planned.get(name.as_str())) {
            continue;
        }
        let carried = match prior_map {
            Some(prior) if !requires_replace => prior.get(name.as_str()).cloned(),
            _ => None,
        };
        planned.insert(name.to_string(), carried.unwrap_or_else(unknown));
    }

    let changes = diff(schema, prior_map, &planned);
    let planned = Value::Object(planned);
    if changes.is_empty() {
        PlanResult::no_change(planned)
    } else {
        PlanResult::with_changes(planned, changes, requires_replace)
    }
}

fn plan_destroy(prior: Option<&Map<String, Value>>) -> PlanResult {
    let Some(prior) = prior else {
        return PlanResult::no_change(Value::Null);
    };
    let mut names: Vec<&String> = prior.keys().collect();
    names.sort();
    let changes = names
        .into_iter()
        .filter(|name| !prior[name.as_str()].is_null())
        .map(|name| AttributeChange::removed(name.as_str(), prior[name.as_str()].clone()))
        .collect();
    PlanResult::with_changes(Value::Null, changes, false)
}

fn diff(
    schema: &Schema,
    prior: Option<&Map<String, Value>>,
    planned: &Map<String, Value>,
) -> Vec<AttributeChange> {
    schema
        .field_names()
        .into_iter()
        .filter_map(|name| {
            let before = prior
                .and_then(|p| p.get(name))
                .filter(|v| !v.is_null())
                .cloned();
            let after = planned.get(name).filter(|v| !v.is_null()).cloned();
            let unchanged = match (&before, &after) {
                (Some(b), Some(a)) => same_field(&schema.block, name, b, a),
                (None, None) => true,
                _ => false,
            };
            (!unchanged).then(|| AttributeChange::new(name, before, after))
        })
        .collect()
}

/// Compare the `name` member of two values of `block`.
fn same_field(block: &Block, name: &str, a: &Value, b: &Value) -> bool {
    if let Some(attr) = block.attributes.get(name) {
        same_attribute(&attr.attr_type, a, b)
    } else if let Some(nested) = block.blocks.get(name) {
        same_nested(nested, a, b)
    } else {
        same_value(a, b)
    }
}

fn same_attribute(attr_type: &AttributeType, a: &Value, b: &Value) -> bool {
    match (attr_type, a, b) {
        (AttributeType::List(element), Value::Array(a), Value::Array(b)) => {
            same_in_order(a, b, |x, y| same_attribute(element, x, y))
        }
        (AttributeType::Set(element), Value::Array(a), Value::Array(b)) => {
            same_in_any_order(a, b, |x, y| same_attribute(element, x, y))
        }
        (AttributeType::Map(element), Value::Object(a), Value::Object(b)) => {
            a.keys().chain(b.keys()).all(|k| {
                same_attribute(
                    element,
                    a.get(k).unwrap_or(&Value::Null),
                    b.get(k).unwrap_or(&Value::Null),
                )
            })
        }
        (AttributeType::Object(members), Value::Object(a), Value::Object(b)) => {
            a.keys().chain(b.keys()).all(|k| {
                let (x, y) = (a.get(k).unwrap_or(&Value::Null), b.get(k).unwrap_or(&Value::Null));
                match members.get(k) {
                    Some(member) => same_attribute(member, x, y),
                    None => same_value(x, y),
                }
            })
        }
        _ => same_value(a, b),
    }
}

fn same_nested(nested: &NestedBlock, a: &Value, b: &Value) -> bool {
    let block = &nested.block;
    match (&nested.nesting_mode, a, b) {
        (BlockNestingMode::List, Value::Array(a), Value::Array(b)) => {
            same_in_order(a, b, |x, y| same_block(block, x, y))
        }
        (BlockNestingMode::Set, Value::Array(a), Value::Array(b)) => {
            same_in_any_order(a, b, |x, y| same_block(block, x, y))
        }
        _ => same_block(block, a, b),
    }
}

fn same_block(block: &Block, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => a.keys().chain(b.keys()).all(|k| {
            same_field(
                block,
                k,
                a.get(k).unwrap_or(&Value::Null),
                b.get(k).unwrap_or(&Value::Null),
            )
        }),
        _ => same_value(a, b),
    }
}

fn same_in_order(a: &[Value], b: &[Value], eq: impl Fn(&Value, &Value) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq(x, y))
}

/// Multiset equality: every element of `a` pairs with a distinct element of `b`.
fn same_in_any_order(a: &[Value], b: &[Value], eq: impl Fn(&Value, &Value) -> bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut matched = vec![false; b.len()];
    a.iter().all(|x| match (0..b.len()).find(|&i| !matched[i] && eq(x, &b[i])) {
        Some(i) => {
            matched[i] = true;
            true
        }
        None => false,
    })
}

/// Structural equality where a null object member equals an absent one.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => a.keys().chain(b.keys()).all(|k| {
            same_value(
                a.get(k).unwrap_or(&Value::Null),
                b.get(k).unwrap_or(&Value::Null),
            )
        }),
        (Value::Array(a), Value::Array(b)) => same_in_order(a, b, same_value),
        _ => a == b,
    }
}

fn is_null_or_absent(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_null)
}
