//! OpenAPI parameter serialization (`style` × `explode`).
//!
//! Every supported combination is listed explicitly; anything not listed is
//! rejected with a contract error naming the style and flag.

use crate::contract::ParameterSpec;
use crate::error::{EngineError, EngineResult};
use crate::types::ParamStyle;
use serde_json::{Map, Value};

/// Effective serialization of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationMethod {
    pub style: ParamStyle,
    pub explode: bool,
}

impl SerializationMethod {
    pub const FORM_EXPLODE: Self = Self {
        style: ParamStyle::Form,
        explode: true,
    };

    fn unsupported(self, shape: &str) -> EngineError {
        EngineError::contract(format!(
            "unsupported {shape} serialization style={}, explode={}",
            self.style, self.explode
        ))
    }
}

/// Whether names, keys and values are percent-escaped as they are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escape {
    Raw,
    Query,
}

impl Escape {
    fn apply(self, s: &str) -> String {
        match self {
            Self::Raw => s.to_string(),
            Self::Query => query_escape(s),
        }
    }
}

/// `application/x-www-form-urlencoded` escaping of one component.
pub fn query_escape(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Render a scalar as text: `null` is empty, strings are unquoted, anything
/// else is its JSON form.
pub fn must_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Encode a parameter value for substitution into a path template.
pub fn encode_param(param: &ParameterSpec, value: &Value) -> EngineResult<String> {
    encode_value(param.serialization_method(), &param.name, value)
}

pub fn encode_value(method: SerializationMethod, name: &str, value: &Value) -> EngineResult<String> {
    match value {
        Value::Object(map) => encode_object(method, name, map, Escape::Raw),
        Value::Array(items) => encode_array(method, name, items, Escape::Raw),
        scalar => encode_primitive(method, name, scalar),
    }
}

fn encode_primitive(method: SerializationMethod, name: &str, value: &Value) -> EngineResult<String> {
    let raw = must_string(value);
    match method.style {
        ParamStyle::Simple => Ok(raw),
        ParamStyle::Label => Ok(format!(".{raw}")),
        ParamStyle::Matrix => Ok(format!(";{}={raw}", query_escape(name))),
        ParamStyle::Form => Ok(format!("{}={}", query_escape(name), query_escape(&raw))),
        ParamStyle::SpaceDelimited | ParamStyle::PipeDelimited | ParamStyle::DeepObject => {
            Err(method.unsupported("primitive"))
        }
    }
}

/// `(prefix, delimiter)` for arrays.
fn array_layout(method: SerializationMethod, name: &str) -> EngineResult<(String, String)> {
    use ParamStyle::*;
    let layout = match (method.style, method.explode) {
        (Matrix, false) => (format!(";{name}="), ",".to_string()),
        (Matrix, true) => (format!(";{name}="), format!(";{name}=")),
        (Label, false) => (".".into(), ",".into()),
        (Label, true) => (".".into(), ".".into()),
        (Form, false) => (format!("{name}="), ",".into()),
        (Form, true) => (format!("{name}="), format!("&{name}=")),
        (Simple, _) => (String::new(), ",".into()),
        (SpaceDelimited, false) => (String::new(), " ".into()),
        (PipeDelimited, false) => (String::new(), "|".into()),
        (SpaceDelimited, true) | (PipeDelimited, true) | (DeepObject, _) => {
            return Err(method.unsupported("array"));
        }
    };
    Ok(layout)
}

/// `(prefix, property delimiter, key/value delimiter)` for objects.
fn object_layout(
    method: SerializationMethod,
    name: &str,
) -> EngineResult<(String, String, String)> {
    use ParamStyle::*;
    let s = |v: &str| v.to_string();
    let layout = match (method.style, method.explode) {
        (Simple, false) => (s(""), s(","), s(",")),
        (Simple, true) => (s(""), s(","), s("=")),
        (Label, false) => (s("."), s("."), s(".")),
        (Label, true) => (s("."), s("."), s("=")),
        (Matrix, false) => (format!(";{name}="), s(","), s(",")),
        (Matrix, true) => (s(";"), s(";"), s("=")),
        (Form, false) => (format!("{name}="), s(","), s(",")),
        (Form, true) => (s(""), s("&"), s("=")),
        (SpaceDelimited, false) => (s(""), s(" "), s(" ")),
        (PipeDelimited, false) => (s(""), s("|"), s("|")),
        (DeepObject, true) => (format!("{name}["), format!("&{name}["), s("]=")),
        (SpaceDelimited, true) | (PipeDelimited, true) | (DeepObject, false) => {
            return Err(method.unsupported("object"));
        }
    };
    Ok(layout)
}

pub(crate) fn encode_array(
    method: SerializationMethod,
    name: &str,
    items: &[Value],
    escape: Escape,
) -> EngineResult<String> {
    let (prefix, delimiter) = array_layout(method, &escape.apply(name))?;
    let parts: Vec<String> = items
        .iter()
        .map(|item| escape.apply(&must_string(item)))
        .collect();
    Ok(format!("{prefix}{}", parts.join(&delimiter)))
}

pub(crate) fn encode_object(
    method: SerializationMethod,
    name: &str,
    map: &Map<String, Value>,
    escape: Escape,
) -> EngineResult<String> {
    let (prefix, props_delim, value_delim) = object_layout(method, &escape.apply(name))?;
    let parts: Vec<String> = map
        .iter()
        .map(|(k, v)| {
            format!(
                "{}{value_delim}{}",
                escape.apply(k),
                escape.apply(&must_string(v))
            )
        })
        .collect();
    Ok(format!("{prefix}{}", parts.join(&props_delim)))
}

/// Query-string values for one argument. Exploded form arrays become one
/// value per element (repeated keys); other array styles join into a single
/// value.
pub fn query_values(method: SerializationMethod, value: &Value) -> EngineResult<Vec<String>> {
    match value {
        Value::Array(items) if method == SerializationMethod::FORM_EXPLODE => {
            Ok(items.iter().map(must_string).collect())
        }
        Value::Array(items) => {
            let (_, delimiter) = array_layout(method, "")?;
            let joined: Vec<String> = items.iter().map(must_string).collect();
            Ok(vec![joined.join(&delimiter)])
        }
        Value::Object(_) => Err(method.unsupported("query object")),
        scalar => Ok(vec![must_string(scalar)]),
    }
}
