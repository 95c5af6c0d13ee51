//! OAuth credential lifecycle and auth injection.

pub mod client;
pub mod credential;
pub mod crypto;
pub mod inject;
pub mod refresher;
pub mod service;

pub use client::{OAuthToken, TokenClient};
pub use credential::{
    next_refresh_at_ms, AuthorizationCodeCredential, AuthorizationCodeMeta, OAuthState,
};
pub use crypto::AesCbcCipher;
pub use inject::{authorization_message, inject_auth, AuthContext, AuthorizationPrompt};
pub use refresher::{RefreshSummary, TokenRefresher};
pub use service::{AgentPluginOAuthStatus, OAuthService, OAuthStatus};

/// Cipher for tokens at rest; same construction as the state cipher.
pub type TokenCipher = AesCbcCipher;
