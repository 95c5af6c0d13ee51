//! Shaping a decoded response to its declared schema.

use crate::contract::Schema;
use crate::error::{EngineError, EngineResult};
use crate::types::{InvalidRespStrategy, SchemaType};
use serde_json::{Map, Number, Value};

/// Apply `strategy` to a top-level response object.
pub fn trim_response(
    body: Map<String, Value>,
    schema: &Schema,
    strategy: InvalidRespStrategy,
) -> EngineResult<Map<String, Value>> {
    match strategy {
        InvalidRespStrategy::ReturnRaw => Ok(strip_unknown(body, schema)),
        InvalidRespStrategy::ReturnDefault => conform_object(body, schema, Mismatch::Zero, ""),
        InvalidRespStrategy::ReturnErr => conform_object(body, schema, Mismatch::Fail, ""),
    }
}

/// Drop unknown and disabled fields, recursing into object children only.
fn strip_unknown(body: Map<String, Value>, schema: &Schema) -> Map<String, Value> {
    body.into_iter()
        .filter_map(|(name, value)| {
            let prop = schema.properties.get(&name)?;
            if prop.is_disabled() {
                return None;
            }
            let value = match (prop.kind, value) {
                (SchemaType::Object, Value::Object(child)) => {
                    Value::Object(strip_unknown(child, prop))
                }
                (_, other) => other,
            };
            Some((name, value))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mismatch {
    /// Substitute the declared type's zero value.
    Zero,
    /// Fail naming the field and expected type.
    Fail,
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn conform_object(
    body: Map<String, Value>,
    schema: &Schema,
    on_mismatch: Mismatch,
    path: &str,
) -> EngineResult<Map<String, Value>> {
    let mut out = Map::new();
    for (name, value) in body {
        let Some(prop) = schema.properties.get(&name) else {
            continue;
        };
        if prop.is_disabled() {
            continue;
        }
        let conformed = conform_value(value, prop, on_mismatch, &child_path(path, &name))?;
        out.insert(name, conformed);
    }
    Ok(out)
}

/// Array elements are never dropped: a mismatched element (including `null`)
/// becomes the zero value or fails, like any other field.
fn conform_value(
    value: Value,
    schema: &Schema,
    on_mismatch: Mismatch,
    path: &str,
) -> EngineResult<Value> {
    let matched = match (schema.kind, value) {
        (SchemaType::String, v @ Value::String(_)) => Some(v),
        (SchemaType::Boolean, v @ Value::Bool(_)) => Some(v),
        (SchemaType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {
            Some(Value::Number(n))
        }
        (SchemaType::Number, v @ Value::Number(_)) => Some(v),
        (SchemaType::Object, Value::Object(map)) => {
            Some(Value::Object(conform_object(map, schema, on_mismatch, path)?))
        }
        (SchemaType::Array, Value::Array(items)) => {
            let Some(item_schema) = schema.items.as_deref() else {
                return Ok(Value::Array(items));
            };
            let conformed = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| conform_value(item, item_schema, on_mismatch, &format!("{path}[{i}]")))
                .collect::<EngineResult<Vec<_>>>()?;
            Some(Value::Array(conformed))
        }
        (SchemaType::Unsupported, _) => {
            return Err(EngineError::contract(format!(
                "unsupported type of response field '{path}'"
            )));
        }
        _ => None,
    };

    match (matched, on_mismatch) {
        (Some(v), _) => Ok(v),
        (None, Mismatch::Zero) => Ok(zero_value(schema.kind)),
        (None, Mismatch::Fail) => Err(EngineError::invalid_response(format!(
            "expected '{path}' to be of type '{}'",
            schema.kind
        ))),
    }
}

fn zero_value(kind: SchemaType) -> Value {
    match kind {
        SchemaType::String => Value::String(String::new()),
        SchemaType::Boolean => Value::Bool(false),
        SchemaType::Integer | SchemaType::Number => Value::Number(Number::from(0)),
        SchemaType::Array => Value::Array(Vec::new()),
        SchemaType::Object => Value::Object(Map::new()),
        SchemaType::Unsupported => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        let mut secret = Schema::string();
        secret.global_disable = true;
        Schema::object([
            ("name", Schema::string()),
            ("count", Schema::integer()),
            ("score", Schema::number()),
            ("ok", Schema::boolean()),
            ("tags", Schema::array(Schema::string())),
            (
                "owner",
                Schema::object([("id", Schema::integer()), ("token", secret.clone())]),
            ),
            ("secret", secret),
        ])
    }

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn raw_strips_unknown_and_disabled_but_keeps_values() {
        let out = trim_response(
            body(json!({
                "name": 5,
                "extra": 1,
                "secret": "s",
                "owner": {"id": "x", "token": "t", "more": 1}
            })),
            &schema(),
            InvalidRespStrategy::ReturnRaw,
        )
        .unwrap();
        assert_eq!(Value::Object(out), json!({"name": 5, "owner": {"id": "x"}}));
    }

    #[test]
    fn default_substitutes_zero_values() {
        let out = trim_response(
            body(json!({
                "name": 5,
                "count": 1.5,
                "score": "high",
                "ok": "yes",
                "tags": "a",
                "owner": [1],
                "extra": true
            })),
            &schema(),
            InvalidRespStrategy::ReturnDefault,
        )
        .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"name": "", "count": 0, "score": 0, "ok": false, "tags": [], "owner": {}})
        );
    }

    #[test]
    fn error_names_nested_field_and_type() {
        let err = trim_response(
            body(json!({"owner": {"id": "x"}})),
            &schema(),
            InvalidRespStrategy::ReturnErr,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidResponse(_)));
        let msg = err.to_string();
        assert!(msg.contains("owner.id"), "{msg}");
        assert!(msg.contains("integer"), "{msg}");
    }

    #[test]
    fn same_input_default_passes_error_fails() {
        let input = json!({"count": "7"});
        assert!(trim_response(body(input.clone()), &schema(), InvalidRespStrategy::ReturnDefault).is_ok());
        assert!(trim_response(body(input), &schema(), InvalidRespStrategy::ReturnErr).is_err());
    }

    #[test]
    fn null_array_elements_are_kept_as_zero_or_fail() {
        let input = json!({"tags": ["a", null, "c"]});
        let out = trim_response(body(input.clone()), &schema(), InvalidRespStrategy::ReturnDefault)
            .unwrap();
        assert_eq!(Value::Object(out), json!({"tags": ["a", "", "c"]}));

        let err = trim_response(body(input), &schema(), InvalidRespStrategy::ReturnErr).unwrap_err();
        assert!(err.to_string().contains("tags[1]"));
    }

    #[test]
    fn matching_values_pass_through_exactly() {
        let parsed: Value =
            serde_json::from_str(r#"{"count": 12345678901234567, "score": 0.10, "ok": true}"#).unwrap();
        let out = trim_response(
            parsed.as_object().cloned().unwrap(),
            &schema(),
            InvalidRespStrategy::ReturnErr,
        )
        .unwrap();
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            r#"{"count":12345678901234567,"score":0.10,"ok":true}"#
        );
    }
}
