//! HTTP operation contract of a single tool.

use crate::contract::Schema;
use crate::encoder::SerializationMethod;
use crate::error::{EngineError, EngineResult};
use crate::types::{MediaType, ParamLocation, ParamStyle, SchemaType, ToolAuthMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

/// A declared non-body (or body-routed) parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    #[serde(rename = "in")]
    pub location: ParamLocation,

    #[serde(default)]
    pub required: bool,

    pub schema: Schema,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ParamStyle>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explode: Option<bool>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, location: ParamLocation, schema: Schema) -> Self {
        Self {
            name: name.into(),
            location,
            required: false,
            schema,
            style: None,
            explode: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_style(mut self, style: ParamStyle, explode: bool) -> Self {
        self.style = Some(style);
        self.explode = Some(explode);
        self
    }

    /// Effective style and explode flag, applying the OpenAPI defaults:
    /// `form` for query and cookie, `simple` for path and header, and
    /// `explode` only for `form`.
    pub fn serialization_method(&self) -> SerializationMethod {
        let style = self.style.unwrap_or(match self.location {
            ParamLocation::Query | ParamLocation::Cookie | ParamLocation::Body => ParamStyle::Form,
            ParamLocation::Path | ParamLocation::Header => ParamStyle::Simple,
        });
        let explode = self.explode.unwrap_or(style == ParamStyle::Form);
        SerializationMethod { style, explode }
    }
}

/// The schema for one media type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaContent {
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,

    /// Keyed by content type, e.g. `application/json`.
    #[serde(default)]
    pub content: BTreeMap<String, MediaContent>,
}

impl RequestBody {
    /// Pick the single usable encoding, by [`MediaType::PRIORITY`].
    pub fn select(&self) -> Option<(MediaType, &Schema)> {
        MediaType::PRIORITY.into_iter().find_map(|media| {
            self.content
                .iter()
                .find(|(ct, _)| ct.parse::<MediaType>().ok() == Some(media))
                .map(|(_, content)| (media, &content.schema))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub content: BTreeMap<String, MediaContent>,
}

/// The OpenAPI operation: parameters, body and responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,

    /// Keyed by status code.
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseBody>,

    #[serde(rename = "x-auth-mode", default)]
    pub auth_mode: ToolAuthMode,
}

impl Operation {
    /// The 200 `application/json` schema trimmed responses are checked against.
    ///
    /// `Ok(None)` when the operation declares no responses at all.
    pub fn response_schema(&self) -> EngineResult<Option<&Schema>> {
        if self.responses.is_empty() {
            return Ok(None);
        }
        let ok = self.responses.get("200").ok_or_else(|| {
            EngineError::contract("the '200' status code is not defined in responses")
        })?;
        let content = ok
            .content
            .iter()
            .find(|(ct, _)| ct.parse::<MediaType>().ok() == Some(MediaType::Json))
            .map(|(_, c)| &c.schema)
            .ok_or_else(|| {
                EngineError::contract(format!(
                    "the '{}' media type is not defined in response",
                    MediaType::Json
                ))
            })?;
        Ok(Some(content))
    }

    /// Replace (or set) the 200 JSON response schema.
    pub fn set_response_schema(&mut self, schema: Schema) {
        let entry = self.responses.entry("200".into()).or_insert_with(|| ResponseBody {
            description: "description".into(),
            content: BTreeMap::new(),
        });
        entry
            .content
            .insert(MediaType::Json.as_str().into(), MediaContent { schema });
    }
}

/// A tool: one HTTP operation exposed by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContract {
    pub id: i64,
    pub plugin_id: i64,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub method: String,

    /// Path template relative to the plugin server URL, e.g. `/pets/{id}`.
    pub sub_url: String,

    /// Draft tools can be switched off for debugging.
    #[serde(default = "default_true")]
    pub activated: bool,

    #[serde(default)]
    pub operation: Operation,
}

impl ToolContract {
    pub fn http_method(&self) -> EngineResult<reqwest::Method> {
        reqwest::Method::from_bytes(self.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            EngineError::contract(format!("invalid http method '{}'", self.method))
        })
    }

    /// Check the placement rules: no object parameters outside the body, no
    /// arrays in the path, scalar array items, and an object request body.
    pub fn validate(&self) -> EngineResult<()> {
        for param in &self.operation.parameters {
            if matches!(param.location, ParamLocation::Cookie | ParamLocation::Body) {
                continue;
            }
            match param.schema.kind {
                SchemaType::Object => {
                    return Err(EngineError::contract(format!(
                        "the type of '{}' parameter '{}' cannot be 'object'",
                        param.location, param.name
                    )));
                }
                SchemaType::Array if param.location == ParamLocation::Path => {
                    return Err(EngineError::contract(format!(
                        "the type of 'path' parameter '{}' cannot be 'array'",
                        param.name
                    )));
                }
                SchemaType::Array => {
                    let item_is_scalar = param
                        .schema
                        .items
                        .as_ref()
                        .map(|items| items.kind.is_scalar())
                        .unwrap_or(false);
                    if !item_is_scalar {
                        return Err(EngineError::contract(format!(
                            "the items of '{}' parameter '{}' must be a scalar type",
                            param.location, param.name
                        )));
                    }
                }
                _ => {}
            }
        }

        if let Some((_, schema)) = self
            .operation
            .request_body
            .as_ref()
            .and_then(RequestBody::select)
        {
            if schema.kind != SchemaType::Object {
                return Err(EngineError::contract(format!(
                    "request body is not object, type={}",
                    schema.kind
                )));
            }
        }

        Ok(())
    }
}
