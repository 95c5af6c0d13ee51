//! Routing of arguments to path, query and header, with default resolution.

use crate::contract::{CommonParams, ParameterSpec, Schema};
use crate::encoder::{encode_param, must_string, query_values};
use crate::error::{EngineError, EngineResult};
use crate::traits::{VariableScope, VariableStore};
use crate::types::ParamLocation;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Supplies defaults for arguments the caller left out.
pub struct DefaultSource<'a> {
    pub variables: &'a dyn VariableStore,
    /// `None` when the call carries no project; variable refs then fail.
    pub scope: Option<&'a VariableScope>,
}

impl DefaultSource<'_> {
    /// The default for `schema`: its bound variable when it has one,
    /// otherwise its static default.
    pub async fn resolve(&self, name: &str, schema: &Schema) -> EngineResult<Option<Value>> {
        let Some(var) = schema.variable_ref.as_deref() else {
            return Ok(schema.static_default().cloned());
        };
        let scope = self.scope.ok_or_else(|| {
            EngineError::argument(format!(
                "parameter '{name}' references variable '{var}' but no project is given"
            ))
        })?;
        let value = self
            .variables
            .get_variable(scope, var)
            .await
            .map_err(EngineError::Internal)?;
        debug!(param = name, variable = var, found = value.is_some(), "resolved variable ref");
        Ok(value.filter(|v| !v.is_null()))
    }
}

/// An argument bound to the parameter that declared it.
#[derive(Debug, Clone)]
pub struct LocatedValue<'a> {
    pub value: Value,
    pub param: &'a ParameterSpec,
}

/// Arguments claimed by path, query and header parameters.
#[derive(Debug, Default)]
pub struct LocationArguments<'a> {
    pub path: BTreeMap<String, LocatedValue<'a>>,
    pub query: BTreeMap<String, LocatedValue<'a>>,
    pub header: BTreeMap<String, LocatedValue<'a>>,
}

impl<'a> LocationArguments<'a> {
    /// Bind every path, query and header parameter to its argument or
    /// default. Missing required parameters fail; missing optional ones are
    /// skipped. Cookie and body parameters are left for the body.
    pub async fn collect(
        args: &Map<String, Value>,
        params: &'a [ParameterSpec],
        defaults: &DefaultSource<'_>,
    ) -> EngineResult<LocationArguments<'a>> {
        let mut located = LocationArguments::default();

        for param in params {
            let bucket = match param.location {
                ParamLocation::Path => &mut located.path,
                ParamLocation::Query => &mut located.query,
                ParamLocation::Header => &mut located.header,
                ParamLocation::Cookie | ParamLocation::Body => continue,
            };

            let value = match args.get(&param.name).filter(|v| !v.is_null()) {
                Some(v) => Some(v.clone()),
                None => defaults.resolve(&param.name, &param.schema).await?,
            };

            match value {
                Some(value) => {
                    bucket.insert(param.name.clone(), LocatedValue { value, param });
                }
                None if param.required => {
                    return Err(EngineError::argument(format!(
                        "the '{}' parameter '{}' is required",
                        param.location, param.name
                    )));
                }
                None => {}
            }
        }

        Ok(located)
    }

    /// Whether `name` was consumed by a non-body location.
    pub fn claims(&self, name: &str) -> bool {
        self.path.contains_key(name) || self.query.contains_key(name) || self.header.contains_key(name)
    }

    /// Substitute path parameters and append the query string.
    pub fn build_url(&self, raw_url: &str, common: &CommonParams) -> EngineResult<Url> {
        let mut templated = raw_url.to_string();
        for (name, located) in &self.path {
            let encoded = encode_param(located.param, &located.value)?;
            templated = templated.replace(&format!("{{{name}}}"), &encoded);
        }

        let mut url = Url::parse(&templated)
            .map_err(|e| EngineError::contract(format!("invalid request url '{templated}': {e}")))?;

        let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, located) in &self.query {
            let values = query_values(located.param.serialization_method(), &located.value)?;
            query.entry(name.clone()).or_default().extend(values);
        }
        for param in &common.query {
            if !query.contains_key(&param.name) {
                query.insert(param.name.clone(), vec![param.value.clone()]);
            }
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in &query {
            for value in values {
                serializer.append_pair(name, value);
            }
        }
        let encoded = serializer.finish();

        if !encoded.is_empty() {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
                _ => encoded,
            };
            url.set_query(Some(&merged));
        }

        Ok(url)
    }

    /// Header parameters, then common headers the tool did not set.
    pub fn build_headers(&self, common: &CommonParams) -> EngineResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        for (name, located) in &self.header {
            let header = header_name(name)?;
            let values = match &located.value {
                Value::Array(items) => items.iter().map(must_string).collect(),
                scalar => vec![must_string(scalar)],
            };
            for value in values {
                headers.append(header.clone(), header_value(name, &value)?);
            }
        }

        for param in &common.header {
            let header = header_name(&param.name)?;
            if !headers.contains_key(&header) {
                headers.insert(header, header_value(&param.name, &param.value)?);
            }
        }

        Ok(headers)
    }
}

fn header_name(name: &str) -> EngineResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| EngineError::argument(format!("invalid header name '{name}': {e}")))
}

fn header_value(name: &str, value: &str) -> EngineResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| EngineError::argument(format!("invalid value for header '{name}': {e}")))
}
