//! Outbound HTTP request construction.

pub mod builder;
pub mod location;

pub use builder::RequestBuilder;
pub use location::{DefaultSource, LocatedValue, LocationArguments};

use crate::types::MediaType;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// A fully built request, ready for auth injection and sending.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// The encoding the body was produced with.
    pub media_type: Option<MediaType>,
}

#[derive(Serialize)]
struct RequestTrace<'a> {
    path: &'a str,
    header: BTreeMap<&'a str, &'a str>,
    query: BTreeMap<String, String>,
    body: Option<Value>,
}

impl HttpRequest {
    /// Compact JSON summary (`path`, first header values, first query values,
    /// body) returned to callers for display. Bearer tokens are redacted.
    pub fn trace(&self) -> String {
        let mut header = BTreeMap::new();
        for name in self.headers.keys() {
            if name == AUTHORIZATION {
                header.insert(name.as_str(), "<redacted>");
            } else if let Some(v) = self.headers.get(name).and_then(|v| v.to_str().ok()) {
                header.insert(name.as_str(), v);
            }
        }

        let mut query = BTreeMap::new();
        for (k, v) in self.url.query_pairs() {
            query.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }

        let body = self.body.as_ref().map(|bytes| {
            serde_json::from_slice::<Value>(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
        });

        let trace = RequestTrace {
            path: self.url.path(),
            header,
            query,
            body,
        };
        serde_json::to_string(&trace).unwrap_or_default()
    }
}
