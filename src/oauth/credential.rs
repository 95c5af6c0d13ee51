//! Stored authorization-code credentials and their validity rules.

use crate::contract::AuthorizationCodeConfig;
use serde::{Deserialize, Serialize};

/// Identity of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorizationCodeMeta {
    pub user_id: String,
    pub plugin_id: i64,
    pub is_draft: bool,
}

/// Payload sealed into the OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    /// Which kind of client started the flow; always `plugin` here.
    #[serde(default)]
    pub client_name: String,
    pub user_id: String,
    pub plugin_id: i64,
    pub is_draft: bool,
}

impl OAuthState {
    pub const PLUGIN_CLIENT: &'static str = "plugin";

    pub fn for_plugin(meta: &AuthorizationCodeMeta) -> Self {
        Self {
            client_name: Self::PLUGIN_CLIENT.into(),
            user_id: meta.user_id.clone(),
            plugin_id: meta.plugin_id,
            is_draft: meta.is_draft,
        }
    }

    pub fn meta(&self) -> AuthorizationCodeMeta {
        AuthorizationCodeMeta {
            user_id: self.user_id.clone(),
            plugin_id: self.plugin_id,
            is_draft: self.is_draft,
        }
    }
}

/// Tokens for one `(user, plugin, draft)` triple. Times are Unix ms; zero
/// means "not set".
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationCodeCredential {
    pub record_id: i64,
    pub meta: AuthorizationCodeMeta,
    /// Provider settings the tokens were minted under.
    pub config: AuthorizationCodeConfig,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expired_at_ms: i64,
    pub next_token_refresh_at_ms: i64,
    pub last_active_at_ms: i64,
}

impl AuthorizationCodeCredential {
    /// Whether the access token may be handed out for `current` provider
    /// settings at `now_ms`.
    pub fn is_usable(&self, current: &AuthorizationCodeConfig, now_ms: i64, retention_ms: i64) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        if self.token_expired_at_ms > 0 && self.token_expired_at_ms <= now_ms {
            return false;
        }
        if self.last_active_at_ms > 0 && self.last_active_at_ms <= now_ms - retention_ms {
            return false;
        }
        current.is_compatible_with(&self.config)
    }
}

/// Refresh halfway to expiry; never for tokens without one.
pub fn next_refresh_at_ms(expired_at_ms: i64, now_ms: i64) -> i64 {
    if expired_at_ms <= 0 {
        return 0;
    }
    now_ms + (expired_at_ms - now_ms) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn config() -> AuthorizationCodeConfig {
        AuthorizationCodeConfig {
            client_id: "cid".into(),
            client_secret: "sec".into(),
            authorization_url: "https://idp.example/authorize".into(),
            token_url: "https://idp.example/token".into(),
            scope: "read".into(),
            content_type: "application/json".into(),
        }
    }

    fn credential(now: i64) -> AuthorizationCodeCredential {
        AuthorizationCodeCredential {
            record_id: 1,
            meta: AuthorizationCodeMeta {
                user_id: "u1".into(),
                plugin_id: 7,
                is_draft: false,
            },
            config: config(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            token_expired_at_ms: now + 3_600_000,
            next_token_refresh_at_ms: now + 1_800_000,
            last_active_at_ms: now,
        }
    }

    #[test]
    fn fresh_credential_is_usable() {
        let now = 1_700_000_000_000;
        assert!(credential(now).is_usable(&config(), now, 15 * DAY_MS));
    }

    #[test]
    fn expired_token_is_not_usable() {
        let now = 1_700_000_000_000;
        let mut c = credential(now);
        c.token_expired_at_ms = now - 1;
        assert!(!c.is_usable(&config(), now, 15 * DAY_MS));
    }

    #[test]
    fn non_expiring_token_is_usable() {
        let now = 1_700_000_000_000;
        let mut c = credential(now);
        c.token_expired_at_ms = 0;
        assert!(c.is_usable(&config(), now, 15 * DAY_MS));
    }

    #[test]
    fn long_idle_credential_is_not_usable() {
        let now = 1_700_000_000_000;
        let mut c = credential(now);
        c.last_active_at_ms = now - 16 * DAY_MS;
        assert!(!c.is_usable(&config(), now, 15 * DAY_MS));
    }

    #[test]
    fn changed_provider_config_is_not_usable() {
        let now = 1_700_000_000_000;
        let mut current = config();
        current.token_url = "https://idp.example/v2/token".into();
        assert!(!credential(now).is_usable(&current, now, 15 * DAY_MS));
    }

    #[test]
    fn refresh_is_scheduled_halfway() {
        assert_eq!(next_refresh_at_ms(0, 1000), 0);
        assert_eq!(next_refresh_at_ms(3000, 1000), 2000);
    }
}
