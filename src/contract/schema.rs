//! JSON-schema-like tree used for parameters, request bodies and responses.

use crate::types::{AssistType, SchemaType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

fn is_false(v: &bool) -> bool {
    !*v
}

/// One node of a parameter, body or response schema.
///
/// The `x-*` fields are the platform's OpenAPI extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: SchemaType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    /// Required property names (object schemas only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Name of a project variable whose current value is the default.
    #[serde(
        rename = "x-variable-ref",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub variable_ref: Option<String>,

    #[serde(
        rename = "x-assist-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assist_type: Option<AssistType>,

    #[serde(rename = "x-global-disable", default, skip_serializing_if = "is_false")]
    pub global_disable: bool,

    #[serde(rename = "x-local-disable", default, skip_serializing_if = "is_false")]
    pub local_disable: bool,
}

impl Schema {
    pub fn new(kind: SchemaType) -> Self {
        Self {
            kind,
            description: None,
            properties: BTreeMap::new(),
            items: None,
            required: Vec::new(),
            default: None,
            variable_ref: None,
            assist_type: None,
            global_disable: false,
            local_disable: false,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn integer() -> Self {
        Self::new(SchemaType::Integer)
    }

    pub fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array)
        }
    }

    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
            ..Self::new(SchemaType::Object)
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_variable_ref(mut self, name: impl Into<String>) -> Self {
        self.variable_ref = Some(name.into());
        self
    }

    pub fn with_assist_type(mut self, assist: AssistType) -> Self {
        self.assist_type = Some(assist);
        self
    }

    pub fn with_required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = names.into_iter().map(Into::into).collect();
        self
    }

    /// Disabled fields never reach the model: they are dropped from trimmed output.
    pub fn is_disabled(&self) -> bool {
        self.global_disable || self.local_disable
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required.iter().any(|r| r == property)
    }

    /// Static default, ignoring an explicit `null`.
    pub fn static_default(&self) -> Option<&Value> {
        self.default.as_ref().filter(|v| !v.is_null())
    }
}
