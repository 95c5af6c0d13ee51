//! Credential injection into a built request.

use crate::contract::{OAuthAuth, PluginAuth, PluginInfo, ServiceTokenAuth, ServiceTokenLocation};
use crate::error::{EngineError, EngineResult};
use crate::oauth::{AuthorizationCodeMeta, OAuthService};
use crate::request::HttpRequest;
use crate::types::{Locale, ToolAuthMode};
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use tracing::debug;

/// Returned instead of a response when the user must authorize the plugin
/// before the same call is retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorizationPrompt {
    pub plugin_id: i64,
    pub plugin_name: String,
    pub auth_url: String,
    pub message: String,
}

/// Who the call is made for.
pub struct AuthContext<'a> {
    pub plugin: &'a PluginInfo,
    pub auth_mode: ToolAuthMode,
    pub user_id: &'a str,
    pub is_draft: bool,
    pub locale: Locale,
}

/// Attach the plugin's credentials to `req`.
///
/// `Ok(Some(prompt))` means no usable OAuth token exists and the operation
/// requires one; nothing should be sent.
pub async fn inject_auth(
    oauth: &OAuthService,
    ctx: &AuthContext<'_>,
    req: &mut HttpRequest,
) -> EngineResult<Option<AuthorizationPrompt>> {
    match &ctx.plugin.auth {
        PluginAuth::None => Ok(None),
        PluginAuth::Service(service) => {
            inject_service_token(service, req)?;
            Ok(None)
        }
        PluginAuth::OAuth(OAuthAuth::ClientCredentials(_)) => Ok(None),
        PluginAuth::OAuth(OAuthAuth::AuthorizationCode(config)) => {
            if ctx.auth_mode == ToolAuthMode::Disabled {
                return Ok(None);
            }
            let meta = AuthorizationCodeMeta {
                user_id: ctx.user_id.to_string(),
                plugin_id: ctx.plugin.id,
                is_draft: ctx.is_draft,
            };
            match oauth.access_token(&meta, config).await? {
                Some(token) => {
                    let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                        EngineError::credential(format!("access token is not a valid header: {e}"))
                    })?;
                    req.headers.insert(AUTHORIZATION, value);
                    Ok(None)
                }
                None if ctx.auth_mode == ToolAuthMode::Supported => {
                    debug!("no token for plugin {}, sending without", ctx.plugin.id);
                    Ok(None)
                }
                None => {
                    let auth_url = oauth.authorization_url(&meta, config)?;
                    Ok(Some(AuthorizationPrompt {
                        plugin_id: ctx.plugin.id,
                        plugin_name: ctx.plugin.name.clone(),
                        message: authorization_message(ctx.locale, &ctx.plugin.name, &auth_url),
                        auth_url,
                    }))
                }
            }
        }
    }
}

fn inject_service_token(service: &ServiceTokenAuth, req: &mut HttpRequest) -> EngineResult<()> {
    match service.location {
        ServiceTokenLocation::Header => {
            let name = HeaderName::from_bytes(service.key.as_bytes()).map_err(|e| {
                EngineError::contract(format!("invalid service token header '{}': {e}", service.key))
            })?;
            if !req.headers.contains_key(&name) {
                let value = HeaderValue::from_str(&service.service_token).map_err(|e| {
                    EngineError::contract(format!("invalid service token value: {e}"))
                })?;
                req.headers.insert(name, value);
            }
        }
        ServiceTokenLocation::Query => {
            let present = req.url.query_pairs().any(|(k, _)| k == service.key.as_str());
            if !present {
                req.url
                    .query_pairs_mut()
                    .append_pair(&service.key, &service.service_token);
            }
        }
    }
    Ok(())
}

/// User-facing text asking for consent, with a markdown link.
pub fn authorization_message(locale: Locale, plugin_name: &str, auth_url: &str) -> String {
    match locale {
        Locale::En => format!(
            "The '{plugin_name}' plugin requires authorization. By authorizing, you agree to share data with the AI model you selected. Please [click here]({auth_url}) to authorize."
        ),
        Locale::Zh => format!(
            "'{plugin_name}' 插件需要授权。授权即表示你同意与所选的 AI 模型共享数据。请[点击这里]({auth_url})进行授权。"
        ),
    }
}
