//! Picks the plugin and tool revisions an execution runs against.

use crate::contract::{merge_agent_tool, PluginInfo, ToolContract};
use crate::engine::{ExecuteRequest, ProjectInfo};
use crate::error::{EngineError, EngineResult};
use crate::traits::PluginRepository;
use crate::types::ExecScene;
use anyhow::Context;
use tracing::debug;

/// Resolve the `(plugin, tool)` pair for `req.scene`.
pub async fn resolve_scene(
    repo: &dyn PluginRepository,
    req: &ExecuteRequest,
) -> EngineResult<(PluginInfo, ToolContract)> {
    let (plugin, tool) = match req.scene {
        ExecScene::OnlineAgent | ExecScene::DraftAgent => agent_pair(repo, req).await?,
        ExecScene::ToolDebug => debug_pair(repo, req).await?,
        ExecScene::Workflow => workflow_pair(repo, req).await?,
    };
    debug!(
        "Resolved plugin {} (version {:?}) and tool {} for {}",
        plugin.id, plugin.version, tool.id, req.scene
    );
    Ok((plugin, tool))
}

async fn agent_pair(
    repo: &dyn PluginRepository,
    req: &ExecuteRequest,
) -> EngineResult<(PluginInfo, ToolContract)> {
    if req.exec_draft_tool {
        return Err(EngineError::argument(format!(
            "draft tool is not supported in {} scene",
            req.scene
        )));
    }
    let project: &ProjectInfo = req.options.project.as_ref().ok_or_else(|| {
        EngineError::argument(format!("project info is required in {} scene", req.scene))
    })?;

    let online = online_tool(repo, req.tool_id).await?;

    let agent_tool = match req.scene {
        ExecScene::DraftAgent => repo
            .get_draft_agent_tool(project.project_id, req.tool_id)
            .await
            .with_context(|| {
                format!(
                    "get draft agent tool failed, agent={}, tool={}",
                    project.project_id, req.tool_id
                )
            })?,
        _ => repo
            .get_version_agent_tool(
                project.project_id,
                req.tool_id,
                project.project_version.as_deref(),
            )
            .await
            .with_context(|| {
                format!(
                    "get version agent tool failed, agent={}, tool={}",
                    project.project_id, req.tool_id
                )
            })?,
    }
    .ok_or_else(|| {
        EngineError::not_found(format!(
            "agent tool (agent {}, tool {})",
            project.project_id, req.tool_id
        ))
    })?;

    let plugin = match req.options.tool_version.as_deref() {
        Some(version) => version_plugin(repo, req.plugin_id, version).await?,
        None => online_plugin(repo, req.plugin_id).await?,
    };

    Ok((plugin, merge_agent_tool(online, &agent_tool)))
}

async fn debug_pair(
    repo: &dyn PluginRepository,
    req: &ExecuteRequest,
) -> EngineResult<(PluginInfo, ToolContract)> {
    if !req.exec_draft_tool {
        let tool = online_tool(repo, req.tool_id).await?;
        let plugin = online_plugin(repo, req.plugin_id).await?;
        return Ok((plugin, tool));
    }

    let tool = draft_tool(repo, req.tool_id).await?;
    let plugin = draft_plugin(repo, req.plugin_id).await?;
    if !tool.activated {
        return Err(EngineError::contract(format!(
            "tool '{}' is deactivated",
            tool.name
        )));
    }
    Ok((plugin, tool))
}

async fn workflow_pair(
    repo: &dyn PluginRepository,
    req: &ExecuteRequest,
) -> EngineResult<(PluginInfo, ToolContract)> {
    if req.exec_draft_tool {
        let plugin = draft_plugin(repo, req.plugin_id).await?;
        let tool = draft_tool(repo, req.tool_id).await?;
        return Ok((plugin, tool));
    }

    match req.options.tool_version.as_deref() {
        Some(version) => {
            let plugin = version_plugin(repo, req.plugin_id, version).await?;
            let tool = repo
                .get_version_tool(req.tool_id, version)
                .await
                .with_context(|| format!("get version tool failed, tool={}", req.tool_id))?
                .ok_or_else(|| {
                    EngineError::not_found(format!("tool '{}' version '{version}'", req.tool_id))
                })?;
            Ok((plugin, tool))
        }
        None => {
            let plugin = online_plugin(repo, req.plugin_id).await?;
            let tool = online_tool(repo, req.tool_id).await?;
            Ok((plugin, tool))
        }
    }
}

// -- Record lookups ----------------------------------------------------------

async fn online_plugin(repo: &dyn PluginRepository, id: i64) -> EngineResult<PluginInfo> {
    repo.get_online_plugin(id)
        .await
        .with_context(|| format!("get online plugin failed, plugin={id}"))?
        .ok_or_else(|| EngineError::not_found(format!("online plugin '{id}'")))
}

async fn draft_plugin(repo: &dyn PluginRepository, id: i64) -> EngineResult<PluginInfo> {
    repo.get_draft_plugin(id)
        .await
        .with_context(|| format!("get draft plugin failed, plugin={id}"))?
        .ok_or_else(|| EngineError::not_found(format!("draft plugin '{id}'")))
}

async fn version_plugin(
    repo: &dyn PluginRepository,
    id: i64,
    version: &str,
) -> EngineResult<PluginInfo> {
    repo.get_version_plugin(id, version)
        .await
        .with_context(|| format!("get version plugin failed, plugin={id}, version={version}"))?
        .ok_or_else(|| EngineError::not_found(format!("plugin '{id}' version '{version}'")))
}

async fn online_tool(repo: &dyn PluginRepository, id: i64) -> EngineResult<ToolContract> {
    repo.get_online_tool(id)
        .await
        .with_context(|| format!("get online tool failed, tool={id}"))?
        .ok_or_else(|| EngineError::not_found(format!("online tool '{id}'")))
}

async fn draft_tool(repo: &dyn PluginRepository, id: i64) -> EngineResult<ToolContract> {
    repo.get_draft_tool(id)
        .await
        .with_context(|| format!("get draft tool failed, tool={id}"))?
        .ok_or_else(|| EngineError::not_found(format!("draft tool '{id}'")))
}
