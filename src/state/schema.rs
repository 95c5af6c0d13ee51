//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Full DDL for the credential database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- OAuth authorization-code credentials, one per (user, plugin, draft)
CREATE TABLE IF NOT EXISTS authorization_codes (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id               TEXT NOT NULL,
    plugin_id             INTEGER NOT NULL,
    is_draft              INTEGER NOT NULL DEFAULT 0,
    oauth_config          TEXT NOT NULL,
    access_token          TEXT NOT NULL,
    refresh_token         TEXT NOT NULL DEFAULT '',
    token_expired_at      INTEGER NOT NULL DEFAULT 0,
    next_token_refresh_at INTEGER NOT NULL DEFAULT 0,
    last_active_at        INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at            TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (user_id, plugin_id, is_draft)
);

CREATE INDEX IF NOT EXISTS idx_auth_codes_next_refresh ON authorization_codes(next_token_refresh_at);
CREATE INDEX IF NOT EXISTS idx_auth_codes_last_active ON authorization_codes(last_active_at);
CREATE INDEX IF NOT EXISTS idx_auth_codes_expired ON authorization_codes(token_expired_at);
"#;
