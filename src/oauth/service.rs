//! Authorization-code flow: token lookup, consent URL, code exchange,
//! status and revocation.

use crate::config::EngineConfig;
use crate::contract::{AuthorizationCodeConfig, PluginInfo};
use crate::error::{EngineError, EngineResult};
use crate::oauth::{
    next_refresh_at_ms, AesCbcCipher, AuthorizationCodeCredential, AuthorizationCodeMeta,
    OAuthState, TokenClient,
};
use crate::traits::{CredentialStore, PluginRepository};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Whether a user still has to authorize a plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OAuthStatus {
    pub is_oauth: bool,
    pub needs_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

/// Authorization state of one plugin used by an agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentPluginOAuthStatus {
    pub plugin_id: i64,
    pub plugin_name: String,
    pub needs_auth: bool,
}

pub struct OAuthService {
    repo: Arc<dyn PluginRepository>,
    store: Arc<dyn CredentialStore>,
    tokens: TokenClient,
    state_cipher: AesCbcCipher,
    redirect_uri: String,
    retention_ms: i64,
    touch_interval_ms: i64,
}

impl OAuthService {
    pub fn new(
        config: &EngineConfig,
        repo: Arc<dyn PluginRepository>,
        store: Arc<dyn CredentialStore>,
        tokens: TokenClient,
    ) -> anyhow::Result<Self> {
        let state_cipher =
            AesCbcCipher::new(&config.state_secret).context("invalid state_secret")?;
        Ok(Self {
            repo,
            store,
            tokens,
            state_cipher,
            redirect_uri: config.redirect_uri(),
            retention_ms: config.oauth.retention_ms(),
            touch_interval_ms: config.oauth.touch_interval_ms(),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// A usable access token for `meta`, or `None` when the user must
    /// (re)authorize. Refreshes `last_active` at most once per touch interval.
    pub async fn access_token(
        &self,
        meta: &AuthorizationCodeMeta,
        config: &AuthorizationCodeConfig,
    ) -> EngineResult<Option<String>> {
        let now = Utc::now().timestamp_millis();
        let Some(credential) = self.store.get(meta).await.map_err(EngineError::Internal)? else {
            debug!(plugin_id = meta.plugin_id, "no stored credential");
            return Ok(None);
        };

        if !credential.is_usable(config, now, self.retention_ms) {
            debug!(plugin_id = meta.plugin_id, "stored credential is not usable");
            return Ok(None);
        }

        if now - credential.last_active_at_ms > self.touch_interval_ms {
            if let Err(e) = self.store.update_last_active(meta, now).await {
                warn!("Failed to touch credential for plugin {}: {e:#}", meta.plugin_id);
            }
        }

        Ok(Some(credential.access_token))
    }

    /// Provider consent URL carrying the sealed state for `meta`.
    pub fn authorization_url(
        &self,
        meta: &AuthorizationCodeMeta,
        config: &AuthorizationCodeConfig,
    ) -> EngineResult<String> {
        let state = serde_json::to_string(&OAuthState::for_plugin(meta))
            .map_err(|e| EngineError::Internal(e.into()))?;
        let sealed = self
            .state_cipher
            .encrypt_str(&state)
            .map_err(|e| EngineError::credential(format!("failed to seal oauth state: {e:#}")))?;

        let mut url = Url::parse(&config.authorization_url).map_err(|e| {
            EngineError::contract(format!(
                "invalid authorization url '{}': {e}",
                config.authorization_url
            ))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &config.client_id)
                .append_pair("redirect_uri", &self.redirect_uri);
            let scopes = config.scopes();
            if !scopes.is_empty() {
                query.append_pair("scope", &scopes.join(" "));
            }
            query.append_pair("state", &sealed);
        }
        Ok(url.into())
    }

    /// Open a `state` value received on the redirect.
    pub fn decode_state(&self, raw_state: &str) -> EngineResult<OAuthState> {
        let unescaped = query_unescape(raw_state);
        let plain = self
            .state_cipher
            .decrypt_str(&unescaped)
            .map_err(|e| EngineError::credential(format!("invalid oauth state: {e:#}")))?;
        serde_json::from_str(&plain)
            .map_err(|e| EngineError::credential(format!("invalid oauth state payload: {e}")))
    }

    /// Complete the redirect: open the state, exchange the code, persist.
    pub async fn handle_callback(
        &self,
        code: &str,
        raw_state: &str,
    ) -> EngineResult<AuthorizationCodeMeta> {
        let state = self.decode_state(raw_state)?;
        self.exchange_code(code, &state).await?;
        Ok(state.meta())
    }

    /// Exchange an authorization code and store the resulting credential.
    pub async fn exchange_code(&self, code: &str, state: &OAuthState) -> EngineResult<()> {
        if code.is_empty() {
            return Err(EngineError::argument("authorization code is empty"));
        }
        let plugin = self.load_plugin(state.plugin_id, state.is_draft).await?;
        let config = plugin.authorization_code().ok_or_else(|| {
            EngineError::credential(format!(
                "plugin '{}' does not use oauth authorization code",
                plugin.id
            ))
        })?;

        let token = self
            .tokens
            .exchange_code(config, code, &self.redirect_uri)
            .await
            .map_err(|e| EngineError::credential(format!("code exchange failed: {e:#}")))?;

        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let expired_at = token.expired_at_ms(now);
        let credential = AuthorizationCodeCredential {
            record_id: 0,
            meta: state.meta(),
            config: config.clone(),
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            token_expired_at_ms: expired_at,
            next_token_refresh_at_ms: next_refresh_at_ms(expired_at, now_ms),
            last_active_at_ms: now_ms,
        };
        self.store
            .upsert(&credential)
            .await
            .map_err(EngineError::Internal)?;

        info!(
            "Stored oauth credential for plugin {} (user {}, draft {})",
            plugin.id, state.user_id, state.is_draft
        );
        Ok(())
    }

    pub async fn oauth_status(
        &self,
        user_id: &str,
        plugin_id: i64,
        is_draft: bool,
    ) -> EngineResult<OAuthStatus> {
        let plugin = self.load_plugin(plugin_id, is_draft).await?;
        let Some(config) = plugin.authorization_code() else {
            return Ok(OAuthStatus {
                is_oauth: false,
                needs_auth: false,
                auth_url: None,
            });
        };

        let meta = AuthorizationCodeMeta {
            user_id: user_id.to_string(),
            plugin_id,
            is_draft,
        };
        if self.access_token(&meta, config).await?.is_some() {
            return Ok(OAuthStatus {
                is_oauth: true,
                needs_auth: false,
                auth_url: None,
            });
        }
        Ok(OAuthStatus {
            is_oauth: true,
            needs_auth: true,
            auth_url: Some(self.authorization_url(&meta, config)?),
        })
    }

    /// Status of every authorization-code plugin bound to `agent_id`.
    /// Plugins without OAuth are left out; a plugin whose status cannot be
    /// read is logged and skipped.
    pub async fn agent_oauth_status(
        &self,
        user_id: &str,
        agent_id: i64,
    ) -> EngineResult<Vec<AgentPluginOAuthStatus>> {
        let plugin_ids = self
            .repo
            .get_agent_plugin_ids(agent_id)
            .await
            .with_context(|| format!("get agent plugin ids failed, agent={agent_id}"))?;

        let mut statuses = Vec::new();
        for plugin_id in plugin_ids {
            let plugin = match self.repo.get_online_plugin(plugin_id).await {
                Ok(Some(plugin)) => plugin,
                Ok(None) => {
                    debug!(plugin_id, agent_id, "agent plugin is not online");
                    continue;
                }
                Err(e) => {
                    warn!("Failed to load plugin {plugin_id} for agent {agent_id}: {e:#}");
                    continue;
                }
            };
            let Some(config) = plugin.authorization_code() else {
                continue;
            };

            let meta = AuthorizationCodeMeta {
                user_id: user_id.to_string(),
                plugin_id,
                is_draft: false,
            };
            match self.access_token(&meta, config).await {
                Ok(token) => statuses.push(AgentPluginOAuthStatus {
                    plugin_id,
                    plugin_name: plugin.name.clone(),
                    needs_auth: token.is_none(),
                }),
                Err(e) => warn!("Failed to read oauth status of plugin {plugin_id}: {e}"),
            }
        }
        Ok(statuses)
    }

    /// Forget the user's credential for a plugin.
    pub async fn revoke(&self, meta: &AuthorizationCodeMeta) -> EngineResult<()> {
        self.store.delete(meta).await.map_err(EngineError::Internal)?;
        info!("Revoked oauth credential for plugin {}", meta.plugin_id);
        Ok(())
    }

    async fn load_plugin(&self, plugin_id: i64, is_draft: bool) -> EngineResult<PluginInfo> {
        let plugin = if is_draft {
            self.repo.get_draft_plugin(plugin_id).await
        } else {
            self.repo.get_online_plugin(plugin_id).await
        }
        .map_err(EngineError::Internal)?;
        plugin.ok_or_else(|| {
            EngineError::not_found(format!(
                "{} plugin '{plugin_id}'",
                if is_draft { "draft" } else { "online" }
            ))
        })
    }
}

/// Percent-decode a query value (`+` is a space).
fn query_unescape(raw: &str) -> String {
    url::form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}
