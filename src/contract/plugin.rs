//! Plugin descriptor: server, authentication and common parameters.

use serde::{Deserialize, Serialize};

fn default_token_content_type() -> String {
    "application/json".into()
}

/// A plugin groups tools that share a server and an auth configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: i64,

    /// Human-facing name, shown in authorization prompts.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub server_url: String,

    #[serde(default)]
    pub auth: PluginAuth,

    #[serde(default)]
    pub common_params: CommonParams,
}

impl PluginInfo {
    /// The authorization-code configuration, when the plugin uses one.
    pub fn authorization_code(&self) -> Option<&AuthorizationCodeConfig> {
        match &self.auth {
            PluginAuth::OAuth(OAuthAuth::AuthorizationCode(cfg)) => Some(cfg),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PluginAuth {
    #[default]
    None,
    Service(ServiceTokenAuth),
    #[serde(rename = "oauth")]
    OAuth(OAuthAuth),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTokenLocation {
    Header,
    Query,
}

/// A static token placed in a header or query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTokenAuth {
    pub location: ServiceTokenLocation,
    pub key: String,
    pub service_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum OAuthAuth {
    AuthorizationCode(AuthorizationCodeConfig),
    /// Accepted in manifests; requests are sent without a token.
    ClientCredentials(ClientCredentialsConfig),
}

/// Provider settings for the OAuth 2.0 authorization-code grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCodeConfig {
    pub client_id: String,
    pub client_secret: String,

    /// The provider's consent page.
    pub authorization_url: String,

    pub token_url: String,

    /// Space-separated scopes.
    #[serde(default)]
    pub scope: String,

    #[serde(default = "default_token_content_type")]
    pub content_type: String,
}

impl AuthorizationCodeConfig {
    pub fn scopes(&self) -> Vec<&str> {
        self.scope.split_whitespace().collect()
    }

    /// Whether a credential minted under `stored` is still valid for `self`.
    ///
    /// Scopes compare as sets of equal size.
    pub fn is_compatible_with(&self, stored: &AuthorizationCodeConfig) -> bool {
        if self.client_id != stored.client_id
            || self.client_secret != stored.client_secret
            || self.authorization_url != stored.authorization_url
            || self.token_url != stored.token_url
            || self.content_type != stored.content_type
        {
            return false;
        }
        let mut current = self.scopes();
        let mut previous = stored.scopes();
        current.sort_unstable();
        previous.sort_unstable();
        current == previous
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

// ---------------------------------------------------------------------------
// Common parameters
// ---------------------------------------------------------------------------

/// A plugin-level constant sent with every tool call unless the tool supplies
/// the same name itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParam {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommonParams {
    #[serde(default)]
    pub header: Vec<CommonParam>,
    #[serde(default)]
    pub query: Vec<CommonParam>,
    /// Values are raw JSON text, merged into JSON bodies as-is.
    #[serde(default)]
    pub body: Vec<CommonParam>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(scope: &str) -> AuthorizationCodeConfig {
        AuthorizationCodeConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            authorization_url: "https://idp.example/authorize".into(),
            token_url: "https://idp.example/token".into(),
            scope: scope.into(),
            content_type: default_token_content_type(),
        }
    }

    #[test]
    fn scope_order_does_not_matter() {
        assert!(config("read write").is_compatible_with(&config("write read")));
    }

    #[test]
    fn added_scope_invalidates() {
        assert!(!config("read write admin").is_compatible_with(&config("read write")));
        assert!(!config("read").is_compatible_with(&config("read write")));
    }

    #[test]
    fn changed_secret_invalidates() {
        let mut rotated = config("read");
        rotated.client_secret = "rotated".into();
        assert!(!rotated.is_compatible_with(&config("read")));
    }

    #[test]
    fn auth_deserializes_from_tagged_yaml() {
        let yaml = r#"
type: oauth
sub_type: authorization_code
client_id: cid
client_secret: s
authorization_url: https://idp.example/authorize
token_url: https://idp.example/token
scope: read
"#;
        let auth: PluginAuth = serde_yaml::from_str(yaml).unwrap();
        match auth {
            PluginAuth::OAuth(OAuthAuth::AuthorizationCode(cfg)) => {
                assert_eq!(cfg.content_type, "application/json");
                assert_eq!(cfg.scopes(), vec!["read"]);
            }
            other => panic!("unexpected auth {other:?}"),
        }
    }
}
