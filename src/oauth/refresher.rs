//! Background refresh daemon for authorization-code credentials.
//!
//! Each pass deletes idle and expired credentials, then refreshes the ones
//! whose refresh time has come with a small worker pool. A credential that
//! cannot be refreshed or saved is deleted, so nothing stays stuck.

use crate::config::RefreshConfig;
use crate::oauth::{next_refresh_at_ms, AuthorizationCodeCredential, TokenClient};
use crate::traits::CredentialStore;
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub deleted_inactive: usize,
    pub deleted_expired: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub evicted: usize,
}

pub struct TokenRefresher {
    store: Arc<dyn CredentialStore>,
    tokens: TokenClient,
    config: RefreshConfig,
    started: AtomicBool,
}

impl TokenRefresher {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenClient, config: RefreshConfig) -> Self {
        Self {
            store,
            tokens,
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the loop. Only the first call starts it; later calls return `None`.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Token refresher already running");
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run(cancel).await }))
    }

    /// Run passes until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Token refresher started");

        loop {
            let pause = match self.tick().await {
                Ok(summary) => {
                    if summary != RefreshSummary::default() {
                        debug!(?summary, "Refresh pass finished");
                    }
                    self.config.interval()
                }
                Err(e) => {
                    error!("Refresh pass failed: {e:#}");
                    std::time::Duration::from_secs(1)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => {
                    info!("Token refresher shutting down");
                    return;
                }
            }
        }
    }

    /// One maintenance pass.
    ///
    /// Cleanup failures are logged and the pass continues; a failure to list
    /// due credentials aborts the pass.
    pub async fn tick(&self) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary::default();
        let now = Utc::now().timestamp_millis();
        let inactive_before = now - self.config.retention_ms();

        match self
            .store
            .delete_inactive(inactive_before, self.config.delete_batch)
            .await
        {
            Ok(n) => summary.deleted_inactive = n,
            Err(e) => warn!("Failed to delete inactive credentials: {e:#}"),
        }
        match self.store.delete_expired(now, self.config.delete_batch).await {
            Ok(n) => summary.deleted_expired = n,
            Err(e) => warn!("Failed to delete expired credentials: {e:#}"),
        }

        let due = self
            .store
            .list_due_for_refresh(now, self.config.refresh_batch)
            .await?;

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut workers = JoinSet::new();
        let mut evict = Vec::new();

        for credential in due {
            if credential.next_token_refresh_at_ms == 0 || credential.token_expired_at_ms == 0 {
                continue;
            }
            if credential.next_token_refresh_at_ms > now
                || credential.last_active_at_ms <= inactive_before
            {
                evict.push(credential.record_id);
                continue;
            }

            let permit = Arc::clone(&semaphore).acquire_owned().await?;
            let store = Arc::clone(&self.store);
            let tokens = self.tokens.clone();
            let config = self.config.clone();
            workers.spawn(async move {
                let _permit = permit;
                refresh_one(store.as_ref(), &tokens, &config, credential).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(true) => summary.refreshed += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!("Refresh worker panicked: {e}");
                }
            }
        }

        if !evict.is_empty() {
            summary.evicted = evict.len();
            if let Err(e) = self.store.delete_by_ids(&evict).await {
                warn!("Failed to evict {} credentials: {e:#}", evict.len());
            }
        }

        Ok(summary)
    }
}

/// Refresh and save one credential, deleting it when either step keeps
/// failing. Returns whether the refresh succeeded.
async fn refresh_one(
    store: &dyn CredentialStore,
    tokens: &TokenClient,
    config: &RefreshConfig,
    mut credential: AuthorizationCodeCredential,
) -> bool {
    let attempts = config.max_attempts.max(1);
    let plugin_id = credential.meta.plugin_id;

    let mut refreshed = None;
    for attempt in 1..=attempts {
        match tokens
            .refresh(&credential.config, &credential.refresh_token)
            .await
        {
            Ok(token) => {
                refreshed = Some(token);
                break;
            }
            Err(e) => {
                warn!("Token refresh for plugin {plugin_id} failed (attempt {attempt}/{attempts}): {e:#}");
                if attempt < attempts {
                    tokio::time::sleep(config.retry_delay()).await;
                }
            }
        }
    }

    let Some(token) = refreshed else {
        discard(store, credential.record_id).await;
        return false;
    };

    let now = Utc::now();
    let expired_at = token.expired_at_ms(now);
    credential.access_token = token.access_token;
    if let Some(refresh_token) = token.refresh_token {
        credential.refresh_token = refresh_token;
    }
    credential.token_expired_at_ms = expired_at;
    credential.next_token_refresh_at_ms = next_refresh_at_ms(expired_at, now.timestamp_millis());
    // Refreshing is not user activity.
    credential.last_active_at_ms = 0;

    for attempt in 1..=attempts {
        match store.upsert(&credential).await {
            Ok(()) => {
                debug!("Refreshed token for plugin {plugin_id}");
                return true;
            }
            Err(e) => {
                warn!("Saving refreshed token for plugin {plugin_id} failed (attempt {attempt}/{attempts}): {e:#}");
                if attempt < attempts {
                    tokio::time::sleep(config.retry_delay()).await;
                }
            }
        }
    }

    discard(store, credential.record_id).await;
    false
}

async fn discard(store: &dyn CredentialStore, record_id: i64) {
    if let Err(e) = store.delete_by_ids(&[record_id]).await {
        error!("Failed to delete credential {record_id}: {e:#}");
    }
}
