//! The execute pipeline.
//!
//! resolve scene → parse and preprocess arguments → build request → inject
//! credentials (or stop with an authorization prompt) → send → trim response.

use crate::contract::{Operation, ResponseBody, Schema, ToolContract};
use crate::engine::{resolve_scene, ExecuteRequest};
use crate::error::{EngineError, EngineResult};
use crate::oauth::{inject_auth, AuthContext, AuthorizationPrompt, OAuthService};
use crate::request::{DefaultSource, HttpRequest, RequestBuilder};
use crate::response::{decode_object, infer_schema, process_response};
use crate::traits::{ObjectStorage, PluginRepository, VariableScope, VariableStore};
use crate::types::{ExecScene, SchemaType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use ulid::Ulid;

const EMPTY_RESPONSE: &str = "{}";

/// What a completed call produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteResponse {
    pub execution_id: String,
    pub tool: ToolContract,
    /// JSON trace of the sent request (`path`, `header`, `query`, `body`).
    pub request: String,
    pub raw_resp: String,
    pub trimmed_resp: String,
    /// Responses inferred from `raw_resp`, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resp_schema: Option<BTreeMap<String, ResponseBody>>,
}

/// Result of [`ToolEngine::execute`].
///
/// `NeedsAuthorization` is not a failure: nothing was sent, and the same call
/// should be retried once the user has completed the consent flow.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecOutcome {
    Completed(ExecuteResponse),
    NeedsAuthorization(AuthorizationPrompt),
}

/// Executes tool calls against the configured collaborators.
pub struct ToolEngine {
    repo: Arc<dyn PluginRepository>,
    variables: Arc<dyn VariableStore>,
    objects: Arc<dyn ObjectStorage>,
    oauth: Arc<OAuthService>,
    http: reqwest::Client,
}

impl ToolEngine {
    pub fn new(
        repo: Arc<dyn PluginRepository>,
        variables: Arc<dyn VariableStore>,
        objects: Arc<dyn ObjectStorage>,
        oauth: Arc<OAuthService>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            repo,
            variables,
            objects,
            oauth,
            http,
        }
    }

    pub fn oauth(&self) -> &Arc<OAuthService> {
        &self.oauth
    }

    /// Run one tool call end to end.
    pub async fn execute(&self, req: ExecuteRequest) -> EngineResult<ExecOutcome> {
        let execution_id = Ulid::new().to_string();
        let span = info_span!(
            "execute_tool",
            execution_id = %execution_id,
            tool_id = req.tool_id,
            plugin_id = req.plugin_id,
            scene = %req.scene,
        );
        self.run(execution_id, req).instrument(span).await
    }

    async fn run(&self, execution_id: String, req: ExecuteRequest) -> EngineResult<ExecOutcome> {
        if req.user_id.is_empty() {
            return Err(EngineError::argument("user id is required"));
        }

        let (plugin, mut tool) = resolve_scene(self.repo.as_ref(), &req).await?;
        if let Some(operation) = &req.options.operation {
            tool.operation = operation.clone();
        }

        let scope = req.options.project.as_ref().map(|p| VariableScope {
            project_id: p.project_id,
            project_version: p.project_version.clone(),
            connector_id: p.connector_id,
            user_id: req.user_id.clone(),
        });
        let builder = RequestBuilder {
            plugin: &plugin,
            tool: &tool,
            scene: req.scene,
            defaults: DefaultSource {
                variables: self.variables.as_ref(),
                scope: scope.as_ref(),
            },
            objects: self.objects.as_ref(),
        };

        let mut args = RequestBuilder::parse_arguments(&req.arguments_json)?;
        builder.preprocess(&mut args).await?;
        let mut http_req = builder.build(args).await?;

        let auth = AuthContext {
            plugin: &plugin,
            auth_mode: tool.operation.auth_mode,
            user_id: &req.user_id,
            is_draft: req.scene == ExecScene::ToolDebug,
            locale: req.options.locale,
        };
        if let Some(prompt) = inject_auth(&self.oauth, &auth, &mut http_req).await? {
            info!("Plugin {} needs authorization, call interrupted", plugin.id);
            return Ok(ExecOutcome::NeedsAuthorization(prompt));
        }

        let request = http_req.trace();
        let raw = self.send(tool.id, http_req).await?;

        let (raw_resp, trimmed_resp) = if raw.is_empty() {
            (EMPTY_RESPONSE.to_string(), EMPTY_RESPONSE.to_string())
        } else {
            let trimmed =
                process_response(&raw, &tool.operation, req.options.invalid_resp_strategy)?;
            let trimmed = if trimmed.is_empty() {
                EMPTY_RESPONSE.to_string()
            } else {
                trimmed
            };
            (raw, trimmed)
        };

        if req.scene == ExecScene::ToolDebug {
            if let Err(e) = self.repo.mark_debug_passed(plugin.id, tool.id).await {
                warn!("Failed to mark tool {} as debug passed: {e:#}", tool.id);
            }
        }

        let resp_schema = if req.options.auto_gen_resp_schema {
            Some(generate_responses(&raw_resp)?)
        } else {
            None
        };

        Ok(ExecOutcome::Completed(ExecuteResponse {
            execution_id,
            tool,
            request,
            raw_resp,
            trimmed_resp,
            resp_schema,
        }))
    }

    /// Send `req` and return the body of a 2xx response.
    async fn send(&self, tool_id: i64, req: HttpRequest) -> EngineResult<String> {
        debug!(
            "Sending {} {} (body {} bytes)",
            req.method,
            req.url,
            req.body.as_ref().map(Vec::len).unwrap_or(0)
        );

        let mut outbound = self
            .http
            .request(req.method, req.url)
            .headers(req.headers);
        if let Some(body) = req.body {
            outbound = outbound.body(body);
        }

        let transport = |status: Option<u16>, body: String| EngineError::Transport {
            tool_id,
            status,
            body,
        };

        let resp = outbound
            .send()
            .await
            .map_err(|e| transport(None, e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| transport(Some(status.as_u16()), e.to_string()))?;

        debug!("Tool responded {}: {}", status, body);

        if !status.is_success() {
            return Err(transport(Some(status.as_u16()), body));
        }
        Ok(body)
    }
}

/// Default responses with the 200 JSON schema inferred from `raw`.
fn generate_responses(raw: &str) -> EngineResult<BTreeMap<String, ResponseBody>> {
    let body = decode_object(raw)?;
    let mut operation = Operation::default();
    let schema = infer_schema(&serde_json::Value::Object(body))
        .unwrap_or_else(|| Schema::new(SchemaType::Object));
    operation.set_response_schema(schema);
    Ok(operation.responses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_responses_carry_inferred_schema() {
        let responses = generate_responses(r#"{"id": 3, "tags": ["a"], "gone": {}}"#).unwrap();
        let schema = &responses["200"].content["application/json"].schema;
        assert_eq!(schema.properties["id"].kind, SchemaType::Integer);
        assert_eq!(schema.properties["tags"].kind, SchemaType::Array);
        assert!(!schema.properties.contains_key("gone"));
    }

    #[test]
    fn generated_responses_default_to_empty_object() {
        let responses = generate_responses("{}").unwrap();
        let schema = &responses["200"].content["application/json"].schema;
        assert_eq!(schema.kind, SchemaType::Object);
        assert!(schema.properties.is_empty());
    }

    #[test]
    fn generation_requires_an_object() {
        assert!(generate_responses("[1]").is_err());
    }
}
