//! Request body encoding for the supported media types.

use crate::encoder::style::{encode_array, encode_object, must_string, Escape, SerializationMethod};
use crate::error::{EngineError, EngineResult};
use crate::types::MediaType;
use serde_json::{Map, Value};

/// Serialize `body` as `media`.
pub fn encode_body(media: MediaType, body: &Map<String, Value>) -> EngineResult<Vec<u8>> {
    match media {
        MediaType::Json | MediaType::ProblemJson => serde_json::to_vec(body)
            .map_err(|e| EngineError::argument(format!("failed to marshal json body: {e}"))),
        MediaType::FormUrlEncoded => encode_form(body).map(String::into_bytes),
        MediaType::Yaml | MediaType::XYaml => {
            let yaml = to_yaml_value(&Value::Object(body.clone()));
            serde_yaml::to_string(&yaml)
                .map(String::into_bytes)
                .map_err(|e| EngineError::argument(format!("failed to marshal yaml body: {e}")))
        }
    }
}

/// Scalars first, sorted by key, then structured fields in form+explode.
fn encode_form(body: &Map<String, Value>) -> EngineResult<String> {
    let mut scalars: Vec<(&String, String)> = body
        .iter()
        .filter(|(_, v)| !v.is_object() && !v.is_array())
        .map(|(k, v)| (k, must_string(v)))
        .collect();
    scalars.sort_by(|a, b| a.0.cmp(b.0));

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in &scalars {
        serializer.append_pair(k, v);
    }
    let mut parts = Vec::new();
    let encoded = serializer.finish();
    if !encoded.is_empty() {
        parts.push(encoded);
    }

    for (k, v) in body {
        let part = match v {
            Value::Array(items) => {
                encode_array(SerializationMethod::FORM_EXPLODE, k, items, Escape::Query)?
            }
            Value::Object(map) => {
                encode_object(SerializationMethod::FORM_EXPLODE, k, map, Escape::Query)?
            }
            _ => continue,
        };
        if !part.is_empty() {
            parts.push(part);
        }
    }

    Ok(parts.join("&"))
}

/// Convert to a YAML tree. Numbers map to the narrowest YAML number that
/// holds them, falling back to their text.
pub fn to_yaml_value(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                serde_yaml::Value::Number(u.into())
            } else if let Some(f) = n.as_f64().filter(|f| f.is_finite()) {
                serde_yaml::Value::Number(f.into())
            } else {
                serde_yaml::Value::String(n.to_string())
            }
        }
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Array(items) => {
            serde_yaml::Value::Sequence(items.iter().map(to_yaml_value).collect())
        }
        Value::Object(map) => serde_yaml::Value::Mapping(
            map.iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), to_yaml_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn json_body_keeps_order_and_numbers() {
        let body: Value = serde_json::from_str(r#"{"b": 1.50, "a": "x"}"#).unwrap();
        let bytes = encode_body(MediaType::Json, &obj(body)).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"b":1.50,"a":"x"}"#);
    }

    #[test]
    fn form_sorts_scalars_and_escapes() {
        let bytes = encode_body(
            MediaType::FormUrlEncoded,
            &obj(json!({"z": "last one", "a": 1, "n": null})),
        )
        .unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a=1&n=&z=last+one");
    }

    #[test]
    fn form_appends_structured_fields_exploded() {
        let bytes = encode_body(
            MediaType::FormUrlEncoded,
            &obj(json!({"tags": ["a b", "c"], "name": "x", "dims": {"w": 2}})),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "name=x&tags=a+b&tags=c&w=2"
        );
    }

    #[test]
    fn yaml_body() {
        let bytes = encode_body(MediaType::Yaml, &obj(json!({"name": "rex", "age": 3}))).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("name: rex"));
        assert!(text.contains("age: 3"));
    }
}
