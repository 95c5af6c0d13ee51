//! [`CredentialStore`] over the SQLite database, with tokens encrypted at rest.

use crate::oauth::{AuthorizationCodeCredential, AuthorizationCodeMeta, TokenCipher};
use crate::state::{AuthorizationCodeRow, Database};
use crate::traits::CredentialStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

pub struct SqliteCredentialStore {
    db: Arc<Mutex<Database>>,
    cipher: TokenCipher,
}

impl SqliteCredentialStore {
    pub fn new(db: Arc<Mutex<Database>>, cipher: TokenCipher) -> Self {
        Self { db, cipher }
    }

    fn to_row(&self, credential: &AuthorizationCodeCredential) -> Result<AuthorizationCodeRow> {
        Ok(AuthorizationCodeRow {
            id: credential.record_id,
            user_id: credential.meta.user_id.clone(),
            plugin_id: credential.meta.plugin_id,
            is_draft: credential.meta.is_draft,
            oauth_config: serde_json::to_string(&credential.config)?,
            access_token: self
                .cipher
                .encrypt_str(&credential.access_token)
                .context("Failed to encrypt access token")?,
            refresh_token: self
                .cipher
                .encrypt_str(&credential.refresh_token)
                .context("Failed to encrypt refresh token")?,
            token_expired_at: credential.token_expired_at_ms,
            next_token_refresh_at: credential.next_token_refresh_at_ms,
            last_active_at: credential.last_active_at_ms,
        })
    }

    fn from_row(&self, row: AuthorizationCodeRow) -> Result<AuthorizationCodeCredential> {
        Ok(AuthorizationCodeCredential {
            record_id: row.id,
            meta: AuthorizationCodeMeta {
                user_id: row.user_id,
                plugin_id: row.plugin_id,
                is_draft: row.is_draft,
            },
            config: serde_json::from_str(&row.oauth_config)
                .context("Stored oauth config is not valid")?,
            access_token: self
                .cipher
                .decrypt_str(&row.access_token)
                .context("Failed to decrypt access token")?,
            refresh_token: self
                .cipher
                .decrypt_str(&row.refresh_token)
                .context("Failed to decrypt refresh token")?,
            token_expired_at_ms: row.token_expired_at,
            next_token_refresh_at_ms: row.next_token_refresh_at,
            last_active_at_ms: row.last_active_at,
        })
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(
        &self,
        meta: &AuthorizationCodeMeta,
    ) -> Result<Option<AuthorizationCodeCredential>> {
        let row = self
            .db
            .lock()
            .await
            .get_authorization_code(&meta.user_id, meta.plugin_id, meta.is_draft)?;
        row.map(|r| self.from_row(r)).transpose()
    }

    async fn upsert(&self, credential: &AuthorizationCodeCredential) -> Result<()> {
        let row = self.to_row(credential)?;
        self.db.lock().await.upsert_authorization_code(&row)
    }

    async fn update_last_active(&self, meta: &AuthorizationCodeMeta, at_ms: i64) -> Result<()> {
        self.db
            .lock()
            .await
            .update_last_active(&meta.user_id, meta.plugin_id, meta.is_draft, at_ms)
    }

    async fn delete(&self, meta: &AuthorizationCodeMeta) -> Result<()> {
        self.db
            .lock()
            .await
            .delete_authorization_code(&meta.user_id, meta.plugin_id, meta.is_draft)
    }

    async fn delete_inactive(&self, last_active_before_ms: i64, limit: usize) -> Result<usize> {
        self.db
            .lock()
            .await
            .delete_inactive_authorization_codes(last_active_before_ms, limit)
    }

    async fn delete_expired(&self, now_ms: i64, limit: usize) -> Result<usize> {
        self.db
            .lock()
            .await
            .delete_expired_authorization_codes(now_ms, limit)
    }

    /// Rows that cannot be decoded are deleted instead of being returned.
    async fn list_due_for_refresh(
        &self,
        now_ms: i64,
        limit: usize,
    ) -> Result<Vec<AuthorizationCodeCredential>> {
        let db = self.db.lock().await;
        let rows = db.list_due_authorization_codes(now_ms, limit)?;

        let mut due = Vec::with_capacity(rows.len());
        let mut broken = Vec::new();
        for row in rows {
            let id = row.id;
            match self.from_row(row) {
                Ok(credential) => due.push(credential),
                Err(e) => {
                    warn!("Dropping unreadable credential {id}: {e:#}");
                    broken.push(id);
                }
            }
        }
        if !broken.is_empty() {
            db.delete_authorization_codes_by_ids(&broken)?;
        }
        Ok(due)
    }

    async fn delete_by_ids(&self, record_ids: &[i64]) -> Result<()> {
        self.db
            .lock()
            .await
            .delete_authorization_codes_by_ids(record_ids)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::AuthorizationCodeConfig;

    fn store() -> SqliteCredentialStore {
        let db = Database::open_memory().unwrap();
        let cipher = TokenCipher::new("0123456789abcdef0123456789abcdef").unwrap();
        SqliteCredentialStore::new(Arc::new(Mutex::new(db)), cipher)
    }

    fn credential() -> AuthorizationCodeCredential {
        AuthorizationCodeCredential {
            record_id: 0,
            meta: AuthorizationCodeMeta {
                user_id: "u1".into(),
                plugin_id: 3,
                is_draft: false,
            },
            config: AuthorizationCodeConfig {
                client_id: "cid".into(),
                client_secret: "sec".into(),
                authorization_url: "https://idp.example/authorize".into(),
                token_url: "https://idp.example/token".into(),
                scope: "read write".into(),
                content_type: "application/json".into(),
            },
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
            token_expired_at_ms: 10_000,
            next_token_refresh_at_ms: 5_000,
            last_active_at_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn tokens_round_trip_encrypted() {
        let store = store();
        store.upsert(&credential()).await.unwrap();

        let raw = store
            .db
            .lock()
            .await
            .get_authorization_code("u1", 3, false)
            .unwrap()
            .unwrap();
        assert_ne!(raw.access_token, "access-1");
        assert_ne!(raw.refresh_token, "refresh-1");

        let loaded = store.get(&credential().meta).await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "access-1");
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.config, credential().config);
        assert!(loaded.record_id > 0);
    }

    #[tokio::test]
    async fn unreadable_due_rows_are_dropped() {
        let store = store();
        store.upsert(&credential()).await.unwrap();
        {
            let db = store.db.lock().await;
            let mut row = db.get_authorization_code("u1", 3, false).unwrap().unwrap();
            row.user_id = "u2".into();
            row.access_token = "not-a-ciphertext".into();
            db.upsert_authorization_code(&row).unwrap();
        }

        let due = store.list_due_for_refresh(6_000, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].meta.user_id, "u1");
        assert_eq!(store.db.lock().await.count_authorization_codes().unwrap(), 1);
    }

    #[tokio::test]
    async fn revoke_and_touch() {
        let store = store();
        let meta = credential().meta;
        store.upsert(&credential()).await.unwrap();

        store.update_last_active(&meta, 7_777).await.unwrap();
        assert_eq!(store.get(&meta).await.unwrap().unwrap().last_active_at_ms, 7_777);

        store.delete(&meta).await.unwrap();
        assert!(store.get(&meta).await.unwrap().is_none());
    }
}
