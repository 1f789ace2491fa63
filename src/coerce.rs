//! # Parameter Coercion
//!
//! Query strings and path segments arrive as strings regardless of their
//! declared type. Before validation, a [`CoercePlan`] rewrites those strings
//! into the JSON types the schema expects: decimal strings into numbers,
//! exactly `"true"`/`"false"` into booleans, lone scalars into singleton
//! arrays where an array is wanted, and selection-tree leaves into booleans.
//!
//! Coercion is deliberately lossy-free: a string that does not parse is left
//! as a string, so validation reports it with the received type instead of
//! coercion inventing an error channel of its own. Date strings are checked
//! but not transformed; they stay strings on the wire.
//!
//! Plans are derived from a schema once per endpoint and cached, so the hot
//! path is a pure value transformation with no schema access. Request bodies
//! arrive as typed JSON already and are never coerced.

use std::collections::HashMap;

use serde_json::Value;

use crate::schema::{LeafKind, Schema};

/// Precompiled coercion strategy for one schema tree
#[derive(Debug, Clone, PartialEq)]
pub enum CoercePlan {
    /// Leave the value untouched
    Passthrough,
    /// Parse decimal strings into numbers
    Number,
    /// Map exactly `"true"`/`"false"` onto booleans
    Boolean,
    /// Coerce the boolean leaves of a nested selection tree
    BoolTree,
    /// Coerce the listed keys of an object; unlisted keys pass through
    Object(HashMap<String, CoercePlan>),
    /// Coerce each element, wrapping a lone scalar into a singleton array
    Array(Box<CoercePlan>),
}

impl CoercePlan {
    /// Derive the plan for a schema
    #[must_use]
    pub fn from_schema(schema: &Schema) -> Self {
        match schema {
            Schema::Leaf(LeafKind::Number) => Self::Number,
            Schema::Leaf(LeafKind::Boolean) => Self::Boolean,
            Schema::Leaf(_) | Schema::Enum(_) | Schema::Any | Schema::Selectable => {
                Self::Passthrough
            }
            Schema::Selection => Self::BoolTree,
            Schema::Object(fields) => {
                let plans: HashMap<String, Self> = fields
                    .iter()
                    .map(|field| (field.name().to_string(), Self::from_schema(field.schema())))
                    .filter(|(_, plan)| *plan != Self::Passthrough)
                    .collect();
                Self::Object(plans)
            }
            Schema::Array(element) => Self::Array(Box::new(Self::from_schema(element))),
            Schema::Optional(inner)
            | Schema::Nullable(inner)
            | Schema::Default(inner, _)
            | Schema::Metadata(inner, _) => Self::from_schema(inner),
        }
    }

    /// Apply the plan to a raw value
    #[must_use]
    pub fn apply(&self, value: Value) -> Value {
        match self {
            Self::Passthrough => value,
            Self::Number => coerce_number(value),
            Self::Boolean => coerce_boolean(value),
            Self::BoolTree => coerce_bool_tree(value),
            Self::Object(plans) => match value {
                Value::Object(map) => Value::Object(
                    map.into_iter()
                        .map(|(key, v)| {
                            let v = match plans.get(&key) {
                                Some(plan) => plan.apply(v),
                                None => v,
                            };
                            (key, v)
                        })
                        .collect(),
                ),
                other => other,
            },
            Self::Array(element) => match value {
                Value::Array(items) => {
                    Value::Array(items.into_iter().map(|v| element.apply(v)).collect())
                }
                scalar => Value::Array(vec![element.apply(scalar)]),
            },
        }
    }
}

fn coerce_number(value: Value) -> Value {
    let Value::String(s) = value else {
        return value;
    };
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(s)
}

fn coerce_boolean(value: Value) -> Value {
    match value {
        Value::String(s) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(s),
        },
        other => other,
    }
}

fn coerce_bool_tree(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| (key, coerce_bool_tree(v)))
                .collect(),
        ),
        other => coerce_boolean(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_parses_integers_and_floats() {
        assert_eq!(CoercePlan::Number.apply(json!("5")), json!(5));
        assert_eq!(CoercePlan::Number.apply(json!("-12")), json!(-12));
        assert_eq!(CoercePlan::Number.apply(json!("5.5")), json!(5.5));
        // integers stay integers
        assert!(CoercePlan::Number.apply(json!("5")).as_i64().is_some());
    }

    #[test]
    fn test_number_leaves_garbage_as_string() {
        assert_eq!(CoercePlan::Number.apply(json!("abc")), json!("abc"));
        assert_eq!(CoercePlan::Number.apply(json!("12px")), json!("12px"));
        assert_eq!(CoercePlan::Number.apply(json!(" 5")), json!(" 5"));
        assert_eq!(CoercePlan::Number.apply(json!("inf")), json!("inf"));
        assert_eq!(CoercePlan::Number.apply(json!("NaN")), json!("NaN"));
    }

    #[test]
    fn test_boolean_requires_exact_literals() {
        assert_eq!(CoercePlan::Boolean.apply(json!("true")), json!(true));
        assert_eq!(CoercePlan::Boolean.apply(json!("false")), json!(false));
        assert_eq!(CoercePlan::Boolean.apply(json!("True")), json!("True"));
        assert_eq!(CoercePlan::Boolean.apply(json!("1")), json!("1"));
    }

    #[test]
    fn test_scalar_wrapped_into_singleton_array() {
        let plan = CoercePlan::Array(Box::new(CoercePlan::Passthrough));
        assert_eq!(plan.apply(json!("user")), json!(["user"]));
        assert_eq!(plan.apply(json!(["a", "b"])), json!(["a", "b"]));
    }

    #[test]
    fn test_object_plan_targets_declared_keys_only() {
        let schema = Schema::object([
            ("bar", Schema::number()),
            ("name", Schema::string()),
        ]);
        let plan = CoercePlan::from_schema(&schema);
        let out = plan.apply(json!({ "bar": "5", "name": "7", "extra": "9" }));
        assert_eq!(out, json!({ "bar": 5, "name": "7", "extra": "9" }));
    }

    #[test]
    fn test_plan_peels_wrappers() {
        let plan = CoercePlan::from_schema(&Schema::number().optional());
        assert_eq!(plan, CoercePlan::Number);
    }

    #[test]
    fn test_datetime_is_passthrough() {
        let plan = CoercePlan::from_schema(&Schema::datetime());
        assert_eq!(plan, CoercePlan::Passthrough);
    }

    #[test]
    fn test_bool_tree_coerces_nested_leaves() {
        let out = CoercePlan::BoolTree.apply(json!({
            "comments": { "id": "true", "text": "false" },
            "flat": "true",
            "broken": "yes"
        }));
        assert_eq!(
            out,
            json!({
                "comments": { "id": true, "text": false },
                "flat": true,
                "broken": "yes"
            })
        );
    }

    #[test]
    fn test_nested_query_schema_plan() {
        let schema = Schema::object([
            ("postId", Schema::number()),
            ("include", Schema::array(Schema::one_of(["user"])).optional()),
            ("select", Schema::selects().optional()),
        ]);
        let plan = CoercePlan::from_schema(&schema);
        let out = plan.apply(json!({
            "postId": "7",
            "include": "user",
            "select": { "comments": { "id": "true" } }
        }));
        assert_eq!(
            out,
            json!({
                "postId": 7,
                "include": ["user"],
                "select": { "comments": { "id": true } }
            })
        );
    }
}
