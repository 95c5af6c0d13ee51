//! Collaborator traits the engine is wired against.
//!
//! The catalog, variable store, object storage and credential store are
//! owned by other services in production; [`crate::catalog`] and
//! [`crate::state`] provide the local implementations.

use crate::contract::{PluginInfo, ToolContract};
use crate::oauth::{AuthorizationCodeCredential, AuthorizationCodeMeta};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read access to plugin and tool revisions.
#[async_trait]
pub trait PluginRepository: Send + Sync {
    async fn get_online_plugin(&self, plugin_id: i64) -> Result<Option<PluginInfo>>;

    async fn get_draft_plugin(&self, plugin_id: i64) -> Result<Option<PluginInfo>>;

    async fn get_version_plugin(&self, plugin_id: i64, version: &str)
        -> Result<Option<PluginInfo>>;

    async fn get_online_tool(&self, tool_id: i64) -> Result<Option<ToolContract>>;

    async fn get_draft_tool(&self, tool_id: i64) -> Result<Option<ToolContract>>;

    async fn get_version_tool(&self, tool_id: i64, version: &str) -> Result<Option<ToolContract>>;

    /// An agent's customisation of a tool while the agent is being edited.
    async fn get_draft_agent_tool(
        &self,
        agent_id: i64,
        tool_id: i64,
    ) -> Result<Option<ToolContract>>;

    /// An agent's customisation of a tool as published with `agent_version`
    /// (latest when `None`).
    async fn get_version_agent_tool(
        &self,
        agent_id: i64,
        tool_id: i64,
        agent_version: Option<&str>,
    ) -> Result<Option<ToolContract>>;

    /// Distinct ids of the plugins whose tools are bound to an agent.
    async fn get_agent_plugin_ids(&self, agent_id: i64) -> Result<Vec<i64>>;

    /// Record that a draft tool ran successfully in a debug session.
    async fn mark_debug_passed(&self, _plugin_id: i64, _tool_id: i64) -> Result<()> {
        Ok(())
    }
}

/// Identifies whose variables a `x-variable-ref` resolves against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableScope {
    pub project_id: i64,
    #[serde(default)]
    pub project_version: Option<String>,
    #[serde(default)]
    pub connector_id: i64,
    pub user_id: String,
}

#[async_trait]
pub trait VariableStore: Send + Sync {
    async fn get_variable(&self, scope: &VariableScope, name: &str) -> Result<Option<Value>>;
}

/// Turns stored object URIs into fetchable URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn object_url(&self, uri: &str) -> Result<String>;
}

/// Persistence for authorization-code credentials.
///
/// Timestamps are Unix milliseconds. Batch operations take a `limit` so a
/// single maintenance pass stays bounded.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, meta: &AuthorizationCodeMeta)
        -> Result<Option<AuthorizationCodeCredential>>;

    /// Insert or replace by `(user_id, plugin_id, is_draft)`. A zero
    /// `last_active_at_ms` keeps the stored value.
    async fn upsert(&self, credential: &AuthorizationCodeCredential) -> Result<()>;

    async fn update_last_active(&self, meta: &AuthorizationCodeMeta, at_ms: i64) -> Result<()>;

    async fn delete(&self, meta: &AuthorizationCodeMeta) -> Result<()>;

    async fn delete_inactive(&self, last_active_before_ms: i64, limit: usize) -> Result<usize>;

    async fn delete_expired(&self, now_ms: i64, limit: usize) -> Result<usize>;

    async fn list_due_for_refresh(
        &self,
        now_ms: i64,
        limit: usize,
    ) -> Result<Vec<AuthorizationCodeCredential>>;

    async fn delete_by_ids(&self, record_ids: &[i64]) -> Result<()>;
}
