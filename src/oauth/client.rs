//! OAuth 2.0 token endpoint client (code exchange and refresh).

use crate::contract::AuthorizationCodeConfig;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Token endpoint client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
}

/// Tokens returned by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Expiry in Unix ms, or zero when absent or already past.
    pub fn expired_at_ms(&self, now: DateTime<Utc>) -> i64 {
        match self.expiry {
            Some(expiry) if expiry > now => expiry.timestamp_millis(),
            _ => 0,
        }
    }
}

// -- Wire types --------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds; some providers send it as a string.
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn from_form(body: &str) -> Self {
        let mut resp = TokenResponse {
            access_token: String::new(),
            refresh_token: None,
            expires_in: None,
            error: None,
            error_description: None,
        };
        for (k, v) in url::form_urlencoded::parse(body.as_bytes()) {
            match k.as_ref() {
                "access_token" => resp.access_token = v.into_owned(),
                "refresh_token" => resp.refresh_token = Some(v.into_owned()),
                "expires_in" => resp.expires_in = Some(Value::String(v.into_owned())),
                "error" => resp.error = Some(v.into_owned()),
                "error_description" => resp.error_description = Some(v.into_owned()),
                _ => {}
            }
        }
        resp
    }

    fn expires_in_secs(&self) -> Option<i64> {
        match self.expires_in.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_token(self, now: DateTime<Utc>) -> Result<OAuthToken> {
        if let Some(error) = self.error {
            bail!(
                "token endpoint returned error '{}': {}",
                error,
                self.error_description.unwrap_or_default()
            );
        }
        if self.access_token.is_empty() {
            bail!("token endpoint response has no access_token");
        }
        let expiry = self
            .expires_in_secs()
            .filter(|secs| *secs > 0)
            .map(|secs| now + Duration::seconds(secs));
        Ok(OAuthToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            expiry,
        })
    }
}

impl TokenClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        config: &AuthorizationCodeConfig,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthToken> {
        debug!("OAuth code exchange: {}", config.token_url);
        self.request_token(
            config,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
            ],
        )
        .await
    }

    /// Trade a refresh token for a new access token. A response without a
    /// refresh token keeps the old one.
    pub async fn refresh(
        &self,
        config: &AuthorizationCodeConfig,
        refresh_token: &str,
    ) -> Result<OAuthToken> {
        debug!("OAuth token refresh: {}", config.token_url);
        let mut token = self
            .request_token(
                config,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.as_str()),
                ],
            )
            .await?;
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    async fn request_token(
        &self,
        config: &AuthorizationCodeConfig,
        form: &[(&str, &str)],
    ) -> Result<OAuthToken> {
        let resp = self
            .http
            .post(&config.token_url)
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .context("token request failed")?;

        let status = resp.status();
        let is_form = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("application/x-www-form-urlencoded") || ct.starts_with("text/plain"))
            .unwrap_or(false);
        let body = resp.text().await.context("failed to read token response")?;

        if !status.is_success() {
            bail!("token request failed ({}): {}", status, body);
        }

        let parsed = if is_form {
            TokenResponse::from_form(&body)
        } else {
            serde_json::from_str(&body).context("failed to parse token response")?
        };
        parsed.into_token(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_encoded_token_response() {
        let now = Utc::now();
        let token = TokenResponse::from_form("access_token=abc&expires_in=3600&scope=repo")
            .into_token(now)
            .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expiry, Some(now + Duration::seconds(3600)));
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn error_field_fails_even_on_success_status() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"error":"invalid_grant","error_description":"expired"}"#).unwrap();
        let err = parsed.into_token(Utc::now()).unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn past_expiry_maps_to_zero() {
        let now = Utc::now();
        let token = OAuthToken {
            access_token: "a".into(),
            refresh_token: None,
            expiry: Some(now - Duration::seconds(5)),
        };
        assert_eq!(token.expired_at_ms(now), 0);
    }
}
