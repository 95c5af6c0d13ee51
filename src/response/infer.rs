//! Response schema inference from an observed body.

use crate::contract::Schema;
use crate::types::SchemaType;
use serde_json::Value;

/// Infer a schema tree for `value`.
///
/// `None` for shapes that carry no type information: `null`, empty objects
/// and empty arrays, and containers holding only such values.
pub fn infer_schema(value: &Value) -> Option<Schema> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(Schema::boolean()),
        Value::String(_) => Some(Schema::string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(Schema::integer()),
        Value::Number(_) => Some(Schema::number()),
        Value::Array(items) => {
            let first = items.first()?;
            infer_schema(first).map(Schema::array)
        }
        Value::Object(map) => {
            let mut schema = Schema::new(SchemaType::Object);
            for (name, child) in map {
                if let Some(child_schema) = infer_schema(child) {
                    schema.properties.insert(name.clone(), child_schema);
                }
            }
            if schema.properties.is_empty() {
                None
            } else {
                Some(schema)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_nested_shape() {
        let schema = infer_schema(&json!({
            "name": "x",
            "count": 3,
            "ratio": 0.5,
            "ok": true,
            "items": [{"id": 1}],
            "owner": {"login": "me"}
        }))
        .unwrap();

        assert_eq!(schema.kind, SchemaType::Object);
        assert_eq!(schema.properties["name"].kind, SchemaType::String);
        assert_eq!(schema.properties["count"].kind, SchemaType::Integer);
        assert_eq!(schema.properties["ratio"].kind, SchemaType::Number);
        assert_eq!(schema.properties["ok"].kind, SchemaType::Boolean);
        let items = &schema.properties["items"];
        assert_eq!(items.kind, SchemaType::Array);
        let item = items.items.as_deref().unwrap();
        assert_eq!(item.properties["id"].kind, SchemaType::Integer);
        assert_eq!(
            schema.properties["owner"].properties["login"].kind,
            SchemaType::String
        );
    }

    #[test]
    fn prunes_empty_and_null() {
        let schema = infer_schema(&json!({
            "keep": 1,
            "none": null,
            "empty_obj": {},
            "empty_arr": [],
            "nested_empty": {"inner": []}
        }))
        .unwrap();
        assert_eq!(schema.properties.len(), 1);
        assert!(schema.properties.contains_key("keep"));

        assert!(infer_schema(&json!({})).is_none());
        assert!(infer_schema(&json!([null])).is_none());
    }
}
