//! Refresh daemon passes against a stub token endpoint.

mod common;

use std::sync::Arc;

use chrono::Utc;
use common::{config, credential_store, oauth_config, StubServer};
use tokio_util::sync::CancellationToken;
use toolrunner::oauth::{
    AuthorizationCodeCredential, AuthorizationCodeMeta, TokenClient, TokenRefresher,
};
use toolrunner::traits::CredentialStore;

fn meta(user: &str) -> AuthorizationCodeMeta {
    AuthorizationCodeMeta {
        user_id: user.into(),
        plugin_id: 1,
        is_draft: false,
    }
}

/// Active credential whose refresh time has passed but which has not expired.
fn due_credential(idp: &StubServer, user: &str, last_active_ms: i64) -> AuthorizationCodeCredential {
    let now = Utc::now().timestamp_millis();
    AuthorizationCodeCredential {
        record_id: 0,
        meta: meta(user),
        config: oauth_config(idp),
        access_token: "old-access".into(),
        refresh_token: "old-refresh".into(),
        token_expired_at_ms: now + 600_000,
        next_token_refresh_at_ms: now - 1_000,
        last_active_at_ms: last_active_ms,
    }
}

fn refresher(store: Arc<dyn CredentialStore>) -> Arc<TokenRefresher> {
    Arc::new(TokenRefresher::new(
        store,
        TokenClient::new(reqwest::Client::new()),
        config().oauth,
    ))
}

#[tokio::test]
async fn due_credential_is_refreshed_and_keeps_activity() {
    let idp = StubServer::start(
        200,
        r#"{"access_token":"new-access","refresh_token":"new-refresh","expires_in":7200}"#,
    )
    .await;
    let store = credential_store();
    let active_at = Utc::now().timestamp_millis() - 5_000;
    store.upsert(&due_credential(&idp, "u1", active_at)).await.unwrap();

    let summary = refresher(store.clone()).tick().await.unwrap();
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.failed, 0);

    let hit = &idp.hits()[0];
    assert_eq!(hit.path, "/token");
    assert!(hit.body_text().contains("grant_type=refresh_token"));
    assert!(hit.body_text().contains("refresh_token=old-refresh"));

    let stored = store.get(&meta("u1")).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "new-access");
    assert_eq!(stored.refresh_token, "new-refresh");
    assert_eq!(stored.last_active_at_ms, active_at);
    assert!(stored.next_token_refresh_at_ms > Utc::now().timestamp_millis());
    assert!(stored.token_expired_at_ms > stored.next_token_refresh_at_ms);
}

#[tokio::test]
async fn rejected_refresh_deletes_credential_after_retries() {
    let idp = StubServer::start(400, r#"{"error":"invalid_grant"}"#).await;
    let store = credential_store();
    let now = Utc::now().timestamp_millis();
    store.upsert(&due_credential(&idp, "u1", now)).await.unwrap();

    let summary = refresher(store.clone()).tick().await.unwrap();
    assert_eq!(summary.refreshed, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(idp.hits().len(), config().oauth.max_attempts as usize);
    assert!(store.get(&meta("u1")).await.unwrap().is_none());
}

#[tokio::test]
async fn idle_and_expired_credentials_are_cleaned_up() {
    let idp = StubServer::start(200, "{}").await;
    let store = credential_store();
    let now = Utc::now().timestamp_millis();
    let retention_ms = config().oauth.retention_ms();

    store
        .upsert(&due_credential(&idp, "idle", now - retention_ms - 60_000))
        .await
        .unwrap();

    let mut expired = due_credential(&idp, "expired", now);
    expired.token_expired_at_ms = now - 1_000;
    expired.next_token_refresh_at_ms = now - 2_000;
    store.upsert(&expired).await.unwrap();

    let mut fresh = due_credential(&idp, "fresh", now);
    fresh.next_token_refresh_at_ms = now + 300_000;
    store.upsert(&fresh).await.unwrap();

    let summary = refresher(store.clone()).tick().await.unwrap();
    assert_eq!(summary.deleted_inactive, 1);
    assert_eq!(summary.deleted_expired, 1);
    assert_eq!(summary.refreshed, 0);
    assert!(idp.hits().is_empty());

    assert!(store.get(&meta("idle")).await.unwrap().is_none());
    assert!(store.get(&meta("expired")).await.unwrap().is_none());
    assert!(store.get(&meta("fresh")).await.unwrap().is_some());
}

#[tokio::test]
async fn refresher_starts_once_and_stops_on_cancel() {
    let store = credential_store();
    let refresher = refresher(store);
    let cancel = CancellationToken::new();

    let handle = refresher.spawn(cancel.clone()).unwrap();
    assert!(refresher.spawn(cancel.clone()).is_none());

    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
