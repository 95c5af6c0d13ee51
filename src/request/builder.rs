//! Turns validated tool arguments into an [`HttpRequest`].

use crate::contract::{CommonParam, PluginInfo, RequestBody, Schema, ToolContract};
use crate::encoder::{encode_body, try_fix_value_type};
use crate::error::{EngineError, EngineResult};
use crate::request::{DefaultSource, HttpRequest, LocationArguments};
use crate::traits::ObjectStorage;
use crate::types::{ExecScene, MediaType, ParamLocation, SchemaType};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Builds the outbound request for one tool call.
pub struct RequestBuilder<'a> {
    pub plugin: &'a PluginInfo,
    pub tool: &'a ToolContract,
    pub scene: ExecScene,
    pub defaults: DefaultSource<'a>,
    pub objects: &'a dyn ObjectStorage,
}

impl<'a> RequestBuilder<'a> {
    /// Parse the caller's JSON arguments, keeping numbers exact.
    pub fn parse_arguments(raw: &str) -> EngineResult<Map<String, Value>> {
        if raw.trim().is_empty() {
            return Err(EngineError::argument("arguments are empty"));
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(EngineError::argument(format!(
                "arguments must be a json object, got {other}"
            ))),
            Err(e) => Err(EngineError::argument(format!("invalid arguments json: {e}"))),
        }
    }

    /// Validate the contract and, in debug sessions, turn uploaded-object
    /// URIs into fetchable URLs.
    pub async fn preprocess(&self, args: &mut Map<String, Value>) -> EngineResult<()> {
        self.tool.validate()?;

        if self.scene != ExecScene::ToolDebug {
            return Ok(());
        }

        for param in &self.tool.operation.parameters {
            if param.location == ParamLocation::Cookie {
                continue;
            }
            if let Some(value) = args.get_mut(&param.name) {
                self.convert_uri(&param.schema, value).await?;
            }
        }

        if let Some((_, schema)) = self.body_schema() {
            for (name, prop) in &schema.properties {
                if let Some(value) = args.get_mut(name) {
                    self.convert_uri(prop, value).await?;
                }
            }
        }

        Ok(())
    }

    async fn convert_uri(&self, schema: &Schema, value: &mut Value) -> EngineResult<()> {
        if schema.kind == SchemaType::Array {
            if let (Some(items_schema), Value::Array(items)) = (schema.items.as_deref(), value) {
                for item in items.iter_mut() {
                    self.convert_scalar_uri(items_schema, item).await?;
                }
            }
            return Ok(());
        }
        self.convert_scalar_uri(schema, value).await
    }

    async fn convert_scalar_uri(&self, schema: &Schema, value: &mut Value) -> EngineResult<()> {
        let is_asset = schema.kind == SchemaType::String
            && schema.assist_type.map(|a| a.is_valid()).unwrap_or(false);
        if !is_asset {
            return Ok(());
        }
        let Value::String(uri) = value else {
            return Ok(());
        };
        if uri.is_empty() || uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(());
        }
        let url = self
            .objects
            .object_url(uri)
            .await
            .map_err(EngineError::Internal)?;
        debug!(uri = %uri, "converted object uri to url");
        *uri = url;
        Ok(())
    }

    fn body_schema(&self) -> Option<(MediaType, &'a Schema)> {
        self.tool
            .operation
            .request_body
            .as_ref()
            .and_then(RequestBody::select)
    }

    /// Route arguments, resolve defaults, and encode the body.
    pub async fn build(&self, mut args: Map<String, Value>) -> EngineResult<HttpRequest> {
        let method = self.tool.http_method()?;
        let raw_url = join_url(&self.plugin.server_url, &self.tool.sub_url);
        let common = &self.plugin.common_params;

        let located =
            LocationArguments::collect(&args, &self.tool.operation.parameters, &self.defaults)
                .await?;
        let url = located.build_url(&raw_url, common)?;
        let mut headers = located.build_headers(common)?;

        args.retain(|name, _| !located.claims(name));
        let body = self.build_body(args, &common.body).await?;

        let (body, media_type) = match body {
            Some((media, bytes)) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(media.as_str()));
                (Some(bytes), Some(media))
            }
            None => (None, None),
        };

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
            media_type,
        })
    }

    async fn build_body(
        &self,
        args: Map<String, Value>,
        common: &[CommonParam],
    ) -> EngineResult<Option<(MediaType, Vec<u8>)>> {
        let mut encoded = None;

        if let Some((media, schema)) = self.body_schema() {
            let mut body = self.inject_defaults(schema, args).await?;
            for (name, prop) in &schema.properties {
                if let Some(slot) = body.get_mut(name) {
                    let value = slot.take();
                    *slot = try_fix_value_type(name, prop, value)?;
                }
            }

            // Non-JSON encodings take common params before encoding.
            if !media.is_json() {
                for param in common {
                    if !body.contains_key(&param.name) {
                        body.insert(param.name.clone(), raw_json(&param.value));
                    }
                }
            }

            if !body.is_empty() {
                encoded = Some((media, encode_body(media, &body)?));
            }
        }

        let json_target = encoded
            .as_ref()
            .map(|(media, _)| media.is_json())
            .unwrap_or(true);
        if json_target && !common.is_empty() {
            encoded = merge_common_json(encoded, common)?;
        }

        Ok(encoded)
    }

    /// Keep only declared properties, filling gaps from defaults. Nested
    /// objects are included only when something was filled in.
    fn inject_defaults<'b>(
        &'b self,
        schema: &'b Schema,
        mut provided: Map<String, Value>,
    ) -> BoxFuture<'b, EngineResult<Map<String, Value>>> {
        Box::pin(async move {
            let mut out = Map::new();
            for (name, prop) in &schema.properties {
                let given = provided.remove(name).filter(|v| !v.is_null());

                if prop.kind == SchemaType::Object {
                    let nested = match given {
                        Some(Value::Object(map)) => map,
                        Some(other) => {
                            out.insert(name.clone(), other);
                            continue;
                        }
                        None => Map::new(),
                    };
                    let filled = self.inject_defaults(prop, nested).await?;
                    if !filled.is_empty() {
                        out.insert(name.clone(), Value::Object(filled));
                    }
                    continue;
                }

                let value = match given {
                    Some(v) => Some(v),
                    None => self.defaults.resolve(name, prop).await?,
                };
                match value {
                    Some(v) => {
                        out.insert(name.clone(), v);
                    }
                    None if schema.is_required(name) => {
                        return Err(EngineError::argument(format!(
                            "the body field '{name}' is required"
                        )));
                    }
                    None => {}
                }
            }
            Ok(out)
        })
    }
}

/// Add common body params the body does not already carry. Values are raw
/// JSON text; anything unparsable is sent as a string.
fn merge_common_json(
    encoded: Option<(MediaType, Vec<u8>)>,
    common: &[CommonParam],
) -> EngineResult<Option<(MediaType, Vec<u8>)>> {
    let mut body = match &encoded {
        Some((_, bytes)) => serde_json::from_slice::<Map<String, Value>>(bytes)
            .map_err(|e| EngineError::Internal(e.into()))?,
        None => Map::new(),
    };

    let missing: Vec<&CommonParam> = common
        .iter()
        .filter(|p| !body.contains_key(&p.name))
        .collect();
    if missing.is_empty() {
        return Ok(encoded);
    }
    for param in missing {
        body.insert(param.name.clone(), raw_json(&param.value));
    }

    let media = encoded.map(|(media, _)| media).unwrap_or(MediaType::Json);
    let bytes = serde_json::to_vec(&body).map_err(|e| EngineError::Internal(e.into()))?;
    Ok(Some((media, bytes)))
}

fn raw_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn join_url(server: &str, sub_url: &str) -> String {
    if sub_url.is_empty() {
        return server.to_string();
    }
    format!(
        "{}/{}",
        server.trim_end_matches('/'),
        sub_url.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CommonParams, MediaContent, Operation, ParameterSpec, PluginAuth};
    use crate::traits::{VariableScope, VariableStore};
    use crate::types::AssistType;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoVars;

    #[async_trait]
    impl VariableStore for NoVars {
        async fn get_variable(&self, _: &VariableScope, _: &str) -> anyhow::Result<Option<Value>> {
            Ok(None)
        }
    }

    struct Cdn;

    #[async_trait]
    impl ObjectStorage for Cdn {
        async fn object_url(&self, uri: &str) -> anyhow::Result<String> {
            Ok(format!("https://cdn.example/{uri}"))
        }
    }

    fn plugin(common: CommonParams) -> PluginInfo {
        PluginInfo {
            id: 1,
            name: "pets".into(),
            version: None,
            server_url: "https://api.example/".into(),
            auth: PluginAuth::None,
            common_params: common,
        }
    }

    fn tool(params: Vec<ParameterSpec>, body: Option<(&str, Schema)>) -> ToolContract {
        ToolContract {
            id: 9,
            plugin_id: 1,
            name: "create".into(),
            version: None,
            method: "post".into(),
            sub_url: "/pets".into(),
            activated: true,
            operation: Operation {
                parameters: params,
                request_body: body.map(|(ct, schema)| RequestBody {
                    required: true,
                    content: [(ct.to_string(), MediaContent { schema })].into_iter().collect(),
                }),
                ..Default::default()
            },
        }
    }

    fn builder<'a>(
        plugin: &'a PluginInfo,
        tool: &'a ToolContract,
        scene: ExecScene,
    ) -> RequestBuilder<'a> {
        RequestBuilder {
            plugin,
            tool,
            scene,
            defaults: DefaultSource {
                variables: &NoVars,
                scope: None,
            },
            objects: &Cdn,
        }
    }

    #[test]
    fn empty_arguments_are_rejected() {
        assert!(RequestBuilder::parse_arguments("  ").is_err());
        assert!(RequestBuilder::parse_arguments("[1]").is_err());
    }

    #[tokio::test]
    async fn body_defaults_coercion_and_unknown_fields() {
        let schema = Schema::object([
            ("name", Schema::string()),
            ("age", Schema::integer()),
            ("kind", Schema::string().with_default(json!("dog"))),
            (
                "owner",
                Schema::object([("city", Schema::string().with_default(json!("Oslo")))]),
            ),
        ])
        .with_required(["name"]);
        let plugin = plugin(CommonParams::default());
        let tool = tool(vec![], Some(("application/json", schema)));
        let b = builder(&plugin, &tool, ExecScene::Workflow);

        let args = RequestBuilder::parse_arguments(r#"{"name":"rex","age":"4","junk":true}"#).unwrap();
        let req = b.build(args).await.unwrap();

        assert_eq!(req.url.as_str(), "https://api.example/pets");
        assert_eq!(req.headers[CONTENT_TYPE], "application/json");
        let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({"age": 4, "kind": "dog", "name": "rex", "owner": {"city": "Oslo"}})
        );
    }

    #[tokio::test]
    async fn missing_required_body_field() {
        let schema = Schema::object([("name", Schema::string())]).with_required(["name"]);
        let plugin = plugin(CommonParams::default());
        let tool = tool(vec![], Some(("application/json", schema)));
        let err = builder(&plugin, &tool, ExecScene::Workflow)
            .build(Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Argument(_)));
    }

    #[tokio::test]
    async fn common_body_params_merge_into_json_without_overwriting() {
        let schema = Schema::object([("name", Schema::string())]);
        let plugin = plugin(CommonParams {
            body: vec![
                CommonParam {
                    name: "name".into(),
                    value: "\"ignored\"".into(),
                },
                CommonParam {
                    name: "client".into(),
                    value: r#"{"v":2}"#.into(),
                },
            ],
            ..Default::default()
        });
        let tool = tool(vec![], Some(("application/json", schema)));
        let req = builder(&plugin, &tool, ExecScene::Workflow)
            .build(RequestBuilder::parse_arguments(r#"{"name":"rex"}"#).unwrap())
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "rex", "client": {"v": 2}}));
    }

    #[tokio::test]
    async fn common_body_without_schema_defaults_to_json() {
        let plugin = plugin(CommonParams {
            body: vec![CommonParam {
                name: "appid".into(),
                value: "\"k1\"".into(),
            }],
            ..Default::default()
        });
        let tool = tool(vec![], None);
        let req = builder(&plugin, &tool, ExecScene::Workflow)
            .build(Map::new())
            .await
            .unwrap();
        assert_eq!(req.headers[CONTENT_TYPE], "application/json");
        assert_eq!(req.body.as_deref(), Some(br#"{"appid":"k1"}"#.as_slice()));
    }

    #[tokio::test]
    async fn no_body_means_no_content_type() {
        let plugin = plugin(CommonParams::default());
        let tool = tool(
            vec![ParameterSpec::new("q", ParamLocation::Query, Schema::string())],
            None,
        );
        let req = builder(&plugin, &tool, ExecScene::Workflow)
            .build(RequestBuilder::parse_arguments(r#"{"q":"x"}"#).unwrap())
            .await
            .unwrap();
        assert!(req.body.is_none());
        assert!(req.headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn form_body() {
        let schema = Schema::object([("a", Schema::string()), ("b", Schema::integer())]);
        let plugin = plugin(CommonParams::default());
        let tool = tool(vec![], Some(("application/x-www-form-urlencoded", schema)));
        let req = builder(&plugin, &tool, ExecScene::Workflow)
            .build(RequestBuilder::parse_arguments(r#"{"b":2,"a":"x y"}"#).unwrap())
            .await
            .unwrap();
        assert_eq!(req.body.as_deref(), Some(b"a=x+y&b=2".as_slice()));
    }

    #[tokio::test]
    async fn debug_scene_converts_asset_uris() {
        let params = vec![
            ParameterSpec::new(
                "photo",
                ParamLocation::Query,
                Schema::string().with_assist_type(AssistType::Image),
            ),
            ParameterSpec::new(
                "docs",
                ParamLocation::Query,
                Schema::array(Schema::string().with_assist_type(AssistType::Doc)),
            ),
        ];
        let plugin = plugin(CommonParams::default());
        let tool = tool(params, None);

        let mut args =
            RequestBuilder::parse_arguments(r#"{"photo":"u/1.png","docs":["a.pdf","https://x/b.pdf"]}"#)
                .unwrap();
        builder(&plugin, &tool, ExecScene::ToolDebug)
            .preprocess(&mut args)
            .await
            .unwrap();
        assert_eq!(args["photo"], json!("https://cdn.example/u/1.png"));
        assert_eq!(
            args["docs"],
            json!(["https://cdn.example/a.pdf", "https://x/b.pdf"])
        );

        let mut untouched = RequestBuilder::parse_arguments(r#"{"photo":"u/1.png"}"#).unwrap();
        builder(&plugin, &tool, ExecScene::Workflow)
            .preprocess(&mut untouched)
            .await
            .unwrap();
        assert_eq!(untouched["photo"], json!("u/1.png"));
    }
}
