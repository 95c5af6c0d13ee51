//! Tool execution: scene resolution, request dispatch and response shaping.

pub mod executor;
pub mod scene;

pub use executor::{ExecOutcome, ExecuteResponse, ToolEngine};
pub use scene::resolve_scene;

use crate::contract::Operation;
use crate::types::{ExecScene, InvalidRespStrategy, Locale};
use serde::{Deserialize, Serialize};

/// The agent or workflow a call is made from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectInfo {
    /// Agent id for agent scenes, workflow id otherwise.
    pub project_id: i64,
    /// Published agent version; `None` means latest.
    #[serde(default)]
    pub project_version: Option<String>,
    #[serde(default)]
    pub connector_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub project: Option<ProjectInfo>,
    #[serde(default)]
    pub invalid_resp_strategy: InvalidRespStrategy,
    /// Pin the plugin (and, for workflows, the tool) to a published version.
    #[serde(default)]
    pub tool_version: Option<String>,
    /// Replaces the resolved tool's operation for this call only.
    #[serde(default)]
    pub operation: Option<Operation>,
    /// Infer a response schema from the raw response.
    #[serde(default)]
    pub auto_gen_resp_schema: bool,
    #[serde(default)]
    pub locale: Locale,
}

/// One tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub scene: ExecScene,
    pub user_id: String,
    pub plugin_id: i64,
    pub tool_id: i64,
    /// Run the draft revision of the tool and plugin.
    #[serde(default)]
    pub exec_draft_tool: bool,
    pub arguments_json: String,
    #[serde(default)]
    pub options: ExecuteOptions,
}

impl ExecuteRequest {
    pub fn new(
        scene: ExecScene,
        user_id: impl Into<String>,
        plugin_id: i64,
        tool_id: i64,
        arguments_json: impl Into<String>,
    ) -> Self {
        Self {
            scene,
            user_id: user_id.into(),
            plugin_id,
            tool_id,
            exec_draft_tool: false,
            arguments_json: arguments_json.into(),
            options: ExecuteOptions::default(),
        }
    }
}
