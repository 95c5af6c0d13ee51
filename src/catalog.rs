//! Local plugin catalog: plugins, tools, agent bindings and project variables.
//!
//! Backs the CLI and the integration tests. A catalog is a YAML document with
//! one list per record kind, e.g.
//!
//! ```yaml
//! plugins:
//!   - id: 1
//!     name: weather
//!     server_url: https://api.weather.example
//! tools:
//!   - id: 10
//!     plugin_id: 1
//!     method: get
//!     sub_url: /weather
//! ```

use crate::contract::{PluginInfo, ToolContract};
use crate::traits::{ObjectStorage, PluginRepository, VariableScope, VariableStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

/// An agent's customisation of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentToolEntry {
    pub agent_id: i64,
    /// Published agent version; `None` for the draft binding.
    #[serde(default)]
    pub agent_version: Option<String>,
    pub tool: ToolContract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEntry {
    pub project_id: i64,
    pub name: String,
    pub value: Value,
}

/// On-disk catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    pub plugins: Vec<PluginInfo>,
    pub draft_plugins: Vec<PluginInfo>,
    /// Published revisions; each must carry a `version`.
    pub plugin_versions: Vec<PluginInfo>,
    pub tools: Vec<ToolContract>,
    pub draft_tools: Vec<ToolContract>,
    pub tool_versions: Vec<ToolContract>,
    pub agent_tools: Vec<AgentToolEntry>,
    pub variables: Vec<VariableEntry>,
}

impl CatalogFile {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse catalog (YAML)")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Catalog file does not exist: {:?}", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {:?}", path))?;
        Self::from_yaml(&text)
    }
}

#[derive(Default)]
struct CatalogData {
    online_plugins: HashMap<i64, PluginInfo>,
    draft_plugins: HashMap<i64, PluginInfo>,
    version_plugins: HashMap<(i64, String), PluginInfo>,
    online_tools: HashMap<i64, ToolContract>,
    draft_tools: HashMap<i64, ToolContract>,
    version_tools: HashMap<(i64, String), ToolContract>,
    /// Bindings in insertion order; the last published one is "latest".
    agent_tools: Vec<AgentToolEntry>,
    variables: HashMap<(i64, String), Value>,
    debug_passed: HashSet<(i64, i64)>,
}

/// In-memory [`PluginRepository`] and [`VariableStore`].
#[derive(Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
}

impl MemoryCatalog {
    pub fn new(file: CatalogFile) -> Self {
        let mut data = CatalogData::default();

        for p in file.plugins {
            data.online_plugins.insert(p.id, p);
        }
        for p in file.draft_plugins {
            data.draft_plugins.insert(p.id, p);
        }
        for p in file.plugin_versions {
            let version = p.version.clone().unwrap_or_default();
            data.version_plugins.insert((p.id, version), p);
        }
        for t in file.tools {
            data.online_tools.insert(t.id, t);
        }
        for t in file.draft_tools {
            data.draft_tools.insert(t.id, t);
        }
        for t in file.tool_versions {
            let version = t.version.clone().unwrap_or_default();
            data.version_tools.insert((t.id, version), t);
        }
        data.agent_tools = file.agent_tools;
        for v in file.variables {
            data.variables.insert((v.project_id, v.name), v.value);
        }

        info!(
            "Loaded catalog: {} plugins, {} tools, {} agent bindings",
            data.online_plugins.len(),
            data.online_tools.len(),
            data.agent_tools.len()
        );
        Self {
            data: RwLock::new(data),
        }
    }

    /// Load from a YAML file; a missing file gives an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(CatalogFile::load(path)?))
    }

    pub async fn set_variable(&self, project_id: i64, name: &str, value: Value) {
        self.data
            .write()
            .await
            .variables
            .insert((project_id, name.to_string()), value);
    }

    pub async fn is_debug_passed(&self, plugin_id: i64, tool_id: i64) -> bool {
        self.data
            .read()
            .await
            .debug_passed
            .contains(&(plugin_id, tool_id))
    }
}

#[async_trait]
impl PluginRepository for MemoryCatalog {
    async fn get_online_plugin(&self, plugin_id: i64) -> Result<Option<PluginInfo>> {
        Ok(self.data.read().await.online_plugins.get(&plugin_id).cloned())
    }

    async fn get_draft_plugin(&self, plugin_id: i64) -> Result<Option<PluginInfo>> {
        Ok(self.data.read().await.draft_plugins.get(&plugin_id).cloned())
    }

    async fn get_version_plugin(
        &self,
        plugin_id: i64,
        version: &str,
    ) -> Result<Option<PluginInfo>> {
        let data = self.data.read().await;
        Ok(data
            .version_plugins
            .get(&(plugin_id, version.to_string()))
            .cloned())
    }

    async fn get_online_tool(&self, tool_id: i64) -> Result<Option<ToolContract>> {
        Ok(self.data.read().await.online_tools.get(&tool_id).cloned())
    }

    async fn get_draft_tool(&self, tool_id: i64) -> Result<Option<ToolContract>> {
        Ok(self.data.read().await.draft_tools.get(&tool_id).cloned())
    }

    async fn get_version_tool(&self, tool_id: i64, version: &str) -> Result<Option<ToolContract>> {
        let data = self.data.read().await;
        Ok(data
            .version_tools
            .get(&(tool_id, version.to_string()))
            .cloned())
    }

    async fn get_draft_agent_tool(
        &self,
        agent_id: i64,
        tool_id: i64,
    ) -> Result<Option<ToolContract>> {
        let data = self.data.read().await;
        Ok(data
            .agent_tools
            .iter()
            .find(|e| e.agent_id == agent_id && e.tool.id == tool_id && e.agent_version.is_none())
            .map(|e| e.tool.clone()))
    }

    async fn get_version_agent_tool(
        &self,
        agent_id: i64,
        tool_id: i64,
        agent_version: Option<&str>,
    ) -> Result<Option<ToolContract>> {
        let data = self.data.read().await;
        let mut published = data.agent_tools.iter().filter(|e| {
            e.agent_id == agent_id && e.tool.id == tool_id && e.agent_version.is_some()
        });
        let found = match agent_version {
            Some(v) => published.find(|e| e.agent_version.as_deref() == Some(v)),
            None => published.last(),
        };
        Ok(found.map(|e| e.tool.clone()))
    }

    async fn get_agent_plugin_ids(&self, agent_id: i64) -> Result<Vec<i64>> {
        let data = self.data.read().await;
        let mut ids: Vec<i64> = data
            .agent_tools
            .iter()
            .filter(|e| e.agent_id == agent_id)
            .map(|e| e.tool.plugin_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn mark_debug_passed(&self, plugin_id: i64, tool_id: i64) -> Result<()> {
        self.data
            .write()
            .await
            .debug_passed
            .insert((plugin_id, tool_id));
        Ok(())
    }
}

#[async_trait]
impl VariableStore for MemoryCatalog {
    async fn get_variable(&self, scope: &VariableScope, name: &str) -> Result<Option<Value>> {
        let data = self.data.read().await;
        Ok(data
            .variables
            .get(&(scope.project_id, name.to_string()))
            .cloned())
    }
}

/// Resolves object URIs by appending them to a base URL.
pub struct PrefixObjectStorage {
    base_url: String,
}

impl PrefixObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for PrefixObjectStorage {
    async fn object_url(&self, uri: &str) -> Result<String> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            uri.trim_start_matches('/')
        );
        let url = Url::parse(&joined)
            .with_context(|| format!("Object uri '{uri}' does not form a valid url"))?;
        Ok(url.into())
    }
}
