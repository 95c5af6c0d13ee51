//! Configuration schema for toolrunner.toml.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Public host of this service; the OAuth redirect URL is built from it.
    pub server_host: String,

    /// AES key (16, 24 or 32 bytes) sealing the OAuth `state` parameter.
    pub state_secret: String,

    /// AES key (16, 24 or 32 bytes) encrypting tokens at rest.
    pub token_secret: String,

    /// Path to the SQLite credential database.
    pub db_path: String,

    /// Path to the YAML plugin/tool catalog.
    pub catalog_path: String,

    /// Base URL that object-storage URIs are resolved against.
    pub object_base_url: String,

    /// Timeout applied to every outbound HTTP call.
    pub http_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Refresh daemon and credential retention.
    pub oauth: RefreshConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_host: "localhost:8888".into(),
            state_secret: String::new(),
            token_secret: String::new(),
            db_path: "~/.toolrunner/state.db".into(),
            catalog_path: "~/.toolrunner/catalog.yml".into(),
            object_base_url: "http://localhost:8888/objects".into(),
            http_timeout_secs: 30,
            log_level: "info".into(),
            oauth: RefreshConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Expand `~` in a configured path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    pub fn resolved_catalog_path(&self) -> String {
        self.resolve_path(&self.catalog_path)
    }

    /// Where providers send the user back after consent.
    pub fn redirect_uri(&self) -> String {
        format!("https://{}/api/oauth/authorization_code", self.server_host)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Tuning for the OAuth refresh daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Pause between maintenance passes.
    pub interval_secs: u64,

    /// Credentials idle longer than this are discarded.
    pub retention_days: i64,

    /// Credentials refreshed per pass.
    pub refresh_batch: usize,

    /// Rows deleted per cleanup statement.
    pub delete_batch: usize,

    /// Concurrent refreshes.
    pub workers: usize,

    /// Attempts per token request and per store write.
    pub max_attempts: u32,

    pub retry_delay_ms: u64,

    /// Minimum gap between two `last_active` updates of one credential.
    pub last_active_touch_secs: i64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            retention_days: 15,
            refresh_batch: 50,
            delete_batch: 100,
            workers: 3,
            max_attempts: 3,
            retry_delay_ms: 1000,
            last_active_touch_secs: 60,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention_days * 24 * 60 * 60 * 1000
    }

    pub fn touch_interval_ms(&self) -> i64 {
        self.last_active_touch_secs * 1000
    }
}
