//! SQLite database wrapper with WAL mode and migration support.

use crate::state::schema;
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::info;

/// One `authorization_codes` row. Tokens are stored as given; callers
/// encrypt them.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationCodeRow {
    pub id: i64,
    pub user_id: String,
    pub plugin_id: i64,
    pub is_draft: bool,
    /// Provider config as JSON.
    pub oauth_config: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expired_at: i64,
    pub next_token_refresh_at: i64,
    pub last_active_at: i64,
}

const ROW_COLUMNS: &str = "id, user_id, plugin_id, is_draft, oauth_config, access_token, \
     refresh_token, token_expired_at, next_token_refresh_at, last_active_at";

impl AuthorizationCodeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            plugin_id: row.get(2)?,
            is_draft: row.get::<_, i64>(3)? != 0,
            oauth_config: row.get(4)?,
            access_token: row.get(5)?,
            refresh_token: row.get(6)?,
            token_expired_at: row.get(7)?,
            next_token_refresh_at: row.get(8)?,
            last_active_at: row.get(9)?,
        })
    }
}

/// The credential state database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Run schema creation and migrations.
    fn migrate(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn
                .execute_batch(schema::CREATE_SCHEMA)
                .context("Failed to create schema")?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else if version < schema::SCHEMA_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Authorization codes
    // -----------------------------------------------------------------------

    pub fn get_authorization_code(
        &self,
        user_id: &str,
        plugin_id: i64,
        is_draft: bool,
    ) -> Result<Option<AuthorizationCodeRow>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM authorization_codes
             WHERE user_id = ?1 AND plugin_id = ?2 AND is_draft = ?3"
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![user_id, plugin_id, is_draft as i64],
                AuthorizationCodeRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert or update by `(user_id, plugin_id, is_draft)`. A zero
    /// `last_active_at` keeps the stored value.
    pub fn upsert_authorization_code(&self, row: &AuthorizationCodeRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO authorization_codes
                (user_id, plugin_id, is_draft, oauth_config, access_token, refresh_token,
                 token_expired_at, next_token_refresh_at, last_active_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id, plugin_id, is_draft) DO UPDATE SET
                oauth_config = excluded.oauth_config,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expired_at = excluded.token_expired_at,
                next_token_refresh_at = excluded.next_token_refresh_at,
                last_active_at = CASE
                    WHEN excluded.last_active_at = 0 THEN authorization_codes.last_active_at
                    ELSE excluded.last_active_at
                END,
                updated_at = datetime('now')",
            params![
                row.user_id,
                row.plugin_id,
                row.is_draft as i64,
                row.oauth_config,
                row.access_token,
                row.refresh_token,
                row.token_expired_at,
                row.next_token_refresh_at,
                row.last_active_at,
            ],
        )?;
        Ok(())
    }

    pub fn update_last_active(
        &self,
        user_id: &str,
        plugin_id: i64,
        is_draft: bool,
        at_ms: i64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE authorization_codes SET last_active_at = ?4, updated_at = datetime('now')
             WHERE user_id = ?1 AND plugin_id = ?2 AND is_draft = ?3",
            params![user_id, plugin_id, is_draft as i64, at_ms],
        )?;
        Ok(())
    }

    pub fn delete_authorization_code(
        &self,
        user_id: &str,
        plugin_id: i64,
        is_draft: bool,
    ) -> Result<()> {
        self.conn.execute(
            "DELETE FROM authorization_codes
             WHERE user_id = ?1 AND plugin_id = ?2 AND is_draft = ?3",
            params![user_id, plugin_id, is_draft as i64],
        )?;
        Ok(())
    }

    /// Delete up to `limit` rows last used at or before `before_ms`.
    pub fn delete_inactive_authorization_codes(&self, before_ms: i64, limit: usize) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM authorization_codes WHERE id IN (
                SELECT id FROM authorization_codes WHERE last_active_at <= ?1 LIMIT ?2
             )",
            params![before_ms, limit as i64],
        )?;
        Ok(deleted)
    }

    /// Delete up to `limit` rows whose token expired at or before `now_ms`.
    pub fn delete_expired_authorization_codes(&self, now_ms: i64, limit: usize) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM authorization_codes WHERE id IN (
                SELECT id FROM authorization_codes
                WHERE token_expired_at > 0 AND token_expired_at <= ?1 LIMIT ?2
             )",
            params![now_ms, limit as i64],
        )?;
        Ok(deleted)
    }

    /// Rows whose refresh time has come, soonest first.
    pub fn list_due_authorization_codes(
        &self,
        now_ms: i64,
        limit: usize,
    ) -> Result<Vec<AuthorizationCodeRow>> {
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM authorization_codes
             WHERE next_token_refresh_at > 0 AND next_token_refresh_at <= ?1
             ORDER BY next_token_refresh_at
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![now_ms, limit as i64], AuthorizationCodeRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_authorization_codes_by_ids(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM authorization_codes WHERE id IN ({placeholders})");
        let deleted = self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(deleted)
    }

    pub fn count_authorization_codes(&self) -> Result<u64> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM authorization_codes", [], |row| {
                    row.get(0)
                })?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user: &str, plugin_id: i64) -> AuthorizationCodeRow {
        AuthorizationCodeRow {
            id: 0,
            user_id: user.into(),
            plugin_id,
            is_draft: false,
            oauth_config: "{}".into(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            token_expired_at: 10_000,
            next_token_refresh_at: 5_000,
            last_active_at: 1_000,
        }
    }

    #[test]
    fn fresh_database_has_schema() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.schema_version(), schema::SCHEMA_VERSION);
        assert_eq!(db.count_authorization_codes().unwrap(), 0);
    }

    #[test]
    fn file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("state.db");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_authorization_code(&row("u1", 1)).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_authorization_codes().unwrap(), 1);
    }

    #[test]
    fn upsert_replaces_by_identity_and_keeps_last_active_on_zero() {
        let db = Database::open_memory().unwrap();
        db.upsert_authorization_code(&row("u1", 1)).unwrap();

        let mut refreshed = row("u1", 1);
        refreshed.access_token = "at2".into();
        refreshed.last_active_at = 0;
        db.upsert_authorization_code(&refreshed).unwrap();

        let stored = db.get_authorization_code("u1", 1, false).unwrap().unwrap();
        assert_eq!(stored.access_token, "at2");
        assert_eq!(stored.last_active_at, 1_000);
        assert_eq!(db.count_authorization_codes().unwrap(), 1);

        let mut touched = row("u1", 1);
        touched.last_active_at = 2_000;
        db.upsert_authorization_code(&touched).unwrap();
        let stored = db.get_authorization_code("u1", 1, false).unwrap().unwrap();
        assert_eq!(stored.last_active_at, 2_000);
    }

    #[test]
    fn draft_and_online_are_separate() {
        let db = Database::open_memory().unwrap();
        db.upsert_authorization_code(&row("u1", 1)).unwrap();
        let mut draft = row("u1", 1);
        draft.is_draft = true;
        db.upsert_authorization_code(&draft).unwrap();
        assert_eq!(db.count_authorization_codes().unwrap(), 2);

        db.delete_authorization_code("u1", 1, true).unwrap();
        assert!(db.get_authorization_code("u1", 1, true).unwrap().is_none());
        assert!(db.get_authorization_code("u1", 1, false).unwrap().is_some());
    }

    #[test]
    fn cleanup_queries_respect_thresholds_and_limits() {
        let db = Database::open_memory().unwrap();
        for (i, user) in ["a", "b", "c"].iter().enumerate() {
            let mut r = row(user, 1);
            r.last_active_at = 100 * (i as i64 + 1);
            db.upsert_authorization_code(&r).unwrap();
        }
        assert_eq!(db.delete_inactive_authorization_codes(200, 1).unwrap(), 1);
        assert_eq!(db.delete_inactive_authorization_codes(200, 10).unwrap(), 1);
        assert_eq!(db.count_authorization_codes().unwrap(), 1);

        let mut never = row("d", 1);
        never.token_expired_at = 0;
        db.upsert_authorization_code(&never).unwrap();
        assert_eq!(db.delete_expired_authorization_codes(20_000, 10).unwrap(), 1);
        assert!(db.get_authorization_code("d", 1, false).unwrap().is_some());
    }

    #[test]
    fn due_rows_are_listed_and_deleted_by_id() {
        let db = Database::open_memory().unwrap();
        let mut later = row("late", 1);
        later.next_token_refresh_at = 9_000;
        db.upsert_authorization_code(&later).unwrap();
        db.upsert_authorization_code(&row("due", 1)).unwrap();
        let mut unscheduled = row("none", 1);
        unscheduled.next_token_refresh_at = 0;
        db.upsert_authorization_code(&unscheduled).unwrap();

        let due = db.list_due_authorization_codes(6_000, 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, "due");

        assert_eq!(db.delete_authorization_codes_by_ids(&[due[0].id]).unwrap(), 1);
        assert_eq!(db.delete_authorization_codes_by_ids(&[]).unwrap(), 0);
        assert_eq!(db.count_authorization_codes().unwrap(), 2);
    }
}
