//! Schema-directed coercion of body values (`"42"` for an integer becomes `42`).
//!
//! Numbers are kept as their literal text so large integers and decimals
//! survive unchanged.

use crate::contract::Schema;
use crate::error::{EngineError, EngineResult};
use crate::types::SchemaType;
use serde_json::{Number, Value};

/// Convert `value` to the JSON type `schema` declares.
///
/// `null` is rejected. Unknown object properties are passed through.
pub fn try_fix_value_type(name: &str, schema: &Schema, value: Value) -> EngineResult<Value> {
    if value.is_null() {
        return Err(EngineError::argument(format!("value of '{name}' is nil")));
    }

    match schema.kind {
        SchemaType::String => try_string(&value)
            .map(Value::String)
            .map_err(|e| mismatch(name, schema.kind, e)),
        SchemaType::Integer => try_int64(&value)
            .map(Value::Number)
            .map_err(|e| mismatch(name, schema.kind, e)),
        SchemaType::Number => try_float64(&value)
            .map(Value::Number)
            .map_err(|e| mismatch(name, schema.kind, e)),
        SchemaType::Boolean => try_bool(&value)
            .map(Value::Bool)
            .map_err(|e| mismatch(name, schema.kind, e)),
        SchemaType::Array => {
            let Value::Array(items) = value else {
                return Err(mismatch(name, schema.kind, "not an array".into()));
            };
            let item_schema = schema.items.as_deref().ok_or_else(|| {
                EngineError::contract(format!("array '{name}' has no items schema"))
            })?;
            items
                .into_iter()
                .map(|item| try_fix_value_type(name, item_schema, item))
                .collect::<EngineResult<Vec<_>>>()
                .map(Value::Array)
        }
        SchemaType::Object => {
            let Value::Object(mut map) = value else {
                return Err(mismatch(name, schema.kind, "not an object".into()));
            };
            for (prop, prop_schema) in &schema.properties {
                if let Some(v) = map.get_mut(prop) {
                    let taken = v.take();
                    *v = try_fix_value_type(prop, prop_schema, taken)?;
                }
            }
            Ok(Value::Object(map))
        }
        SchemaType::Unsupported => Err(EngineError::contract(format!(
            "unsupported schema type of '{name}'"
        ))),
    }
}

fn mismatch(name: &str, expected: SchemaType, detail: String) -> EngineError {
    EngineError::argument(format!(
        "failed to convert '{name}' to {expected}: {detail}"
    ))
}

fn try_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("cannot convert {other} to string")),
    }
}

/// Integers: unparsable strings become `0`, fractional numbers truncate.
fn try_int64(value: &Value) -> Result<Number, String> {
    match value {
        Value::String(s) => Ok(Number::from(s.trim().parse::<i64>().unwrap_or(0))),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.clone()),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Number::from(f.trunc() as i64))
            .ok_or_else(|| format!("cannot convert {n} to integer")),
        other => Err(format!("cannot convert {other} to integer")),
    }
}

fn try_float64(value: &Value) -> Result<Number, String> {
    match value {
        Value::Number(n) => Ok(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            // Keep the literal when it is already valid JSON number text.
            if let Ok(n) = serde_json::from_str::<Number>(s) {
                return Ok(n);
            }
            let f: f64 = s.parse().map_err(|e| format!("'{s}': {e}"))?;
            Number::from_f64(f).ok_or_else(|| format!("'{s}' is not a finite number"))
        }
        other => Err(format!("cannot convert {other} to number")),
    }
}

/// Accepts the usual spellings: `1 t T TRUE true True` and their negatives.
fn try_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.as_str() {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            other => Err(format!("invalid boolean '{other}'")),
        },
        other => Err(format!("cannot convert {other} to boolean")),
    }
}
