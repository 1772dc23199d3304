//! Lifecycle Manager (SPEC_FULL.md §4.4): spawn, parent auto-detection,
//! terminate (with cascade), interrupt, and resource-limit enforcement.

use chrono::Utc;
use orc_core::config::DaemonConfig;
use orc_core::daemon::SharedStateDaemon;
use orc_core::types::{AgentKind, InstanceId, InstanceRecord, InstanceState, ResourceLimits};
use orc_core::Error;
use orc_mux::tmux::{CaptureMode, NamedKey, Tmux};
use orc_wiring::mcp_config::{self, ToolServerSpec};
use orc_wiring::prompts;

use std::sync::Arc;

use crate::registry::InstanceRegistry;

pub struct SpawnRequest {
    pub name: Option<String>,
    pub role: String,
    pub kind: AgentKind,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub initial_prompt: Option<String>,
    pub parent_id: Option<InstanceId>,
    pub resource_limits: ResourceLimits,
    pub wait_for_ready: bool,
    pub tool_servers: Vec<ToolServerSpec>,
}

const READY_MARKERS_CLAUDE: &[&str] = &["Human:", "? for shortcuts", ">"];
const READY_MARKERS_CODEX: &[&str] = &["codex>", "› "];

fn ready_markers(kind: AgentKind) -> &'static [&'static str] {
    match kind {
        AgentKind::Claude => READY_MARKERS_CLAUDE,
        AgentKind::Codex => READY_MARKERS_CODEX,
    }
}

fn agent_command(kind: AgentKind, mcp_config_path: Option<&str>) -> String {
    match kind {
        AgentKind::Claude => {
            if let Some(path) = mcp_config_path {
                format!("claude --mcp-config {path} --settings-sources project")
            } else {
                "claude --settings-sources project".to_string()
            }
        }
        AgentKind::Codex => "codex".to_string(),
    }
}

/// Strategy 1/2/3 of parent auto-detection (SPEC_FULL.md §4.4.2). Strictly
/// additive: callers with an explicit parent_id never call this.
pub fn detect_parent(registry: &InstanceRegistry) -> Option<InstanceId> {
    let all = registry.list_all();

    if let Some(busy) = all.iter().find(|r| r.state == InstanceState::Busy) {
        return Some(busy.id.clone());
    }

    all.into_iter()
        .filter(|r| r.request_count > 0 && !r.state.is_terminal())
        .max_by_key(|r| r.last_activity_at)
        .map(|r| r.id)
}

#[allow(clippy::too_many_arguments)]
pub async fn spawn(
    registry: &Arc<InstanceRegistry>,
    tmux: Tmux,
    max_concurrent: usize,
    workspace_base_dir: &str,
    prompts_dir: &str,
    daemon_config: &DaemonConfig,
    auth_key: &str,
    gateway_url: &str,
    req: SpawnRequest,
) -> Result<InstanceId, Error> {
    let active = registry.active_count();
    if active >= max_concurrent {
        return Err(Error::CapacityExceeded {
            current: active,
            max: max_concurrent,
        });
    }

    let is_root_spawn = !registry.has_root();
    let parent_id = if req.parent_id.is_some() {
        req.parent_id.clone()
    } else if is_root_spawn {
        None
    } else {
        match detect_parent(registry) {
            Some(p) => Some(p),
            None => {
                return Err(Error::ParentUnresolvable {
                    reason: "no explicit parent given and none could be auto-detected".into(),
                })
            }
        }
    };

    let existing_names = registry.names();
    let seed = Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64 ^ (active as u64);
    let display_name = req.name.unwrap_or_else(|| {
        crate::names::disambiguate(&crate::names::generate_name(seed), &existing_names)
    });

    let record = InstanceRecord::new(
        display_name.clone(),
        req.role.clone(),
        req.kind,
        req.model,
        format!("{workspace_base_dir}/{display_name}"),
        parent_id.clone(),
        req.resource_limits,
    );

    tokio::fs::create_dir_all(&record.workspace_path).await?;
    tokio::fs::write(
        format!("{}/.instance_id", record.workspace_path),
        record.id.as_str(),
    )
    .await?;

    let role_prompt = match &req.system_prompt {
        Some(p) => p.clone(),
        None => prompts::load_role_prompt(prompts_dir, &req.role).await,
    };
    let protocol_addendum = format!(
        "\n\nYou are instance `{}` (parent: {}). Reply to requests using the reply_to_caller tool, \
         echoing the correlation id given in `[MSG:<id>]` prefixes.",
        record.id,
        parent_id
            .as_ref()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    let composed_prompt = format!(
        "{role_prompt}\n\nYou are known as \"{display_name}\".{protocol_addendum}"
    );

    let tool_servers = mcp_config::with_self_injected(
        req.tool_servers,
        req.kind,
        daemon_config,
        auth_key,
        gateway_url,
    );

    let mcp_config_path = if req.kind == AgentKind::Claude {
        Some(mcp_config::configure_claude(&record.workspace_path, &tool_servers).await?)
    } else {
        None
    };

    registry.insert(record.clone())?;

    tmux.new_session(&display_name, Some(&record.workspace_path))
        .await
        .map_err(|e| {
            let _ = registry.mark_error(&record.id, e.to_string());
            e
        })?;
    tmux.send_line(&display_name, &agent_command(req.kind, mcp_config_path.as_deref()), true)
        .await?;

    let init_registry = registry.clone();
    let init_id = record.id.clone();
    let init_pane = display_name.clone();
    let init_kind = req.kind;
    let init_prompt = composed_prompt.clone();
    let init_initial = req.initial_prompt.clone();
    let init_servers = tool_servers;

    if req.wait_for_ready {
        init_instance(
            &init_registry,
            &tmux,
            &init_id,
            &init_pane,
            init_kind,
            &init_prompt,
            init_initial.as_deref(),
            &init_servers,
        )
        .await?;
        registry.set_state(&record.id, InstanceState::Running)?;
    } else {
        let registry_owned_id = record.id.clone();
        tokio::spawn(async move {
            let result = init_instance(
                &init_registry,
                &tmux,
                &init_id,
                &init_pane,
                init_kind,
                &init_prompt,
                init_initial.as_deref(),
                &init_servers,
            )
            .await;
            match result {
                Ok(()) => {
                    let _ = init_registry.set_state(&init_id, InstanceState::Running);
                    tracing::info!(instance_id = %registry_owned_id, "instance ready");
                }
                Err(e) => {
                    let _ = init_registry.mark_error(&init_id, e.to_string());
                    tracing::warn!(instance_id = %registry_owned_id, error = %e, "instance init failed");
                }
            }
        });
    }

    Ok(record.id)
}

#[allow(clippy::too_many_arguments)]
async fn init_instance(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    id: &InstanceId,
    pane: &str,
    kind: AgentKind,
    composed_prompt: &str,
    initial_prompt: Option<&str>,
    tool_servers: &[ToolServerSpec],
) -> Result<(), Error> {
    wait_for_ready(tmux, pane, kind).await;

    if kind == AgentKind::Codex {
        mcp_config::configure_codex(tmux, pane, tool_servers).await?;
        orc_mux::pacer::send_paced(tmux, pane, composed_prompt, true).await?;
        if let Some(msg) = initial_prompt {
            orc_mux::pacer::send_paced(tmux, pane, msg, true).await?;
        }
    } else {
        registry.with_mut(id, |rec| {
            rec.pending_system_prompt = Some(composed_prompt.to_string());
        })?;
        if let Some(msg) = initial_prompt {
            orc_mux::pacer::send_paced(tmux, pane, msg, true).await?;
        }
    }
    Ok(())
}

async fn wait_for_ready(tmux: &Tmux, pane: &str, kind: AgentKind) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(6);
    loop {
        if let Ok(text) = tmux.capture_pane(pane, CaptureMode::LastN(20)).await {
            if ready_markers(kind).iter().any(|m| text.contains(m)) {
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(pane, "ready marker not observed before deadline, proceeding anyway");
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    }
}

pub async fn interrupt(registry: &InstanceRegistry, tmux: &Tmux, id: &InstanceId) -> Result<bool, Error> {
    let record = registry.get(id).ok_or_else(|| Error::instance_not_found(id.as_str()))?;
    tmux.send_named_key(&record.display_name, NamedKey::Interrupt).await?;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let confirmed = tmux
        .capture_pane(&record.display_name, CaptureMode::LastN(5))
        .await
        .map(|t| t.to_lowercase().contains("interrupt"))
        .unwrap_or(false);
    registry.set_state(id, InstanceState::Idle)?;
    Ok(confirmed)
}

/// File extensions eligible for archival into the artifacts directory on
/// termination (SPEC_FULL.md §4.4.3 step 4) — a deliberately small, fixed set
/// rather than a configurable pattern language (archival beyond copy + JSON
/// sidecar is out of scope).
const ARCHIVE_EXTENSIONS: &[&str] = &["md", "json", "jsonl", "txt", "log"];

#[derive(serde::Serialize)]
struct ArchiveMetadata {
    instance_id: String,
    display_name: String,
    role: String,
    terminated_at: chrono::DateTime<Utc>,
    archived_files: Vec<String>,
}

/// Copies every workspace file matching `ARCHIVE_EXTENSIONS` into
/// `<artifacts_dir>/<instance_id>/`, alongside a `metadata.json` sidecar
/// describing the instance and what was archived.
async fn archive_workspace(record: &InstanceRecord, artifacts_dir: &str) -> Result<(), Error> {
    let session_dir = format!("{artifacts_dir}/{}", record.id.as_str());
    tokio::fs::create_dir_all(&session_dir).await?;

    let mut archived_files = Vec::new();
    let mut entries = tokio::fs::read_dir(&record.workspace_path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| ARCHIVE_EXTENSIONS.contains(&ext))
            .unwrap_or(false);
        if !matches_extension {
            continue;
        }
        let file_name = entry.file_name();
        let dest = std::path::Path::new(&session_dir).join(&file_name);
        tokio::fs::copy(&path, &dest).await?;
        archived_files.push(file_name.to_string_lossy().to_string());
    }

    let metadata = ArchiveMetadata {
        instance_id: record.id.as_str().to_string(),
        display_name: record.display_name.clone(),
        role: record.role.clone(),
        terminated_at: Utc::now(),
        archived_files,
    };
    tokio::fs::write(
        format!("{session_dir}/metadata.json"),
        serde_json::to_string_pretty(&metadata)?,
    )
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn terminate(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    daemon: &dyn SharedStateDaemon,
    id: &InstanceId,
    force: bool,
    artifacts_dir: &str,
    preserve_artifacts: bool,
) -> Result<Vec<Error>, Error> {
    let record = registry.get(id).ok_or_else(|| Error::instance_not_found(id.as_str()))?;
    if record.state == InstanceState::Busy && !force {
        return Err(Error::wrong_state(id.as_str(), record.state.to_string()));
    }

    let mut errors = Vec::new();
    for child in registry.children_of(id) {
        if let Some(child_rec) = registry.get(&child) {
            if !child_rec.state.is_terminal() {
                match Box::pin(terminate(
                    registry,
                    tmux,
                    daemon,
                    &child,
                    true,
                    artifacts_dir,
                    preserve_artifacts,
                ))
                .await
                {
                    Ok(sub_errors) => errors.extend(sub_errors),
                    Err(e) => errors.push(e),
                }
            }
        }
    }

    if let Err(e) = tmux.kill_session(&record.display_name).await {
        errors.push(e);
    }

    registry.set_state(id, InstanceState::Terminated)?;

    if preserve_artifacts {
        if let Err(e) = archive_workspace(&record, artifacts_dir).await {
            errors.push(e);
        }
    }

    let _ = tokio::fs::remove_dir_all(&record.workspace_path).await;
    daemon.cleanup_instance(id.as_str()).await;

    Ok(errors)
}

/// Resource-limit sweep (SPEC_FULL.md §4.4.5). Returns the ids terminated.
#[allow(clippy::too_many_arguments)]
pub async fn sweep_resource_limits(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    daemon: &dyn SharedStateDaemon,
    artifacts_dir: &str,
    preserve_artifacts: bool,
) -> Vec<InstanceId> {
    let mut terminated = Vec::new();
    for record in registry.list_all() {
        if record.state.is_terminal() {
            continue;
        }
        let mut reason = None;
        if let Some(timeout_min) = record.resource_limits.timeout_minutes {
            let idle_for = Utc::now() - record.last_activity_at;
            if idle_for.num_minutes() >= timeout_min as i64 {
                reason = Some(format!("idle for {}m >= timeout {}m", idle_for.num_minutes(), timeout_min));
            }
        }
        if reason.is_none() {
            if let Some(max_tokens) = record.resource_limits.max_tokens {
                if record.cumulative_tokens > max_tokens {
                    reason = Some(format!("tokens {} > max {}", record.cumulative_tokens, max_tokens));
                }
            }
        }
        if reason.is_none() {
            if let Some(max_cost) = record.resource_limits.max_cost {
                if record.cumulative_cost > max_cost {
                    reason = Some(format!("cost {:.4} > max {:.4}", record.cumulative_cost, max_cost));
                }
            }
        }
        if let Some(reason) = reason {
            tracing::warn!(instance_id = %record.id, reason, "resource limit exceeded, terminating");
            let _ = terminate(registry, tmux, daemon, &record.id, true, artifacts_dir, preserve_artifacts).await;
            terminated.push(record.id);
        }
    }
    terminated
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::types::ResourceLimits;

    fn make_record(parent: Option<InstanceId>, state: InstanceState) -> InstanceRecord {
        let mut r = InstanceRecord::new(
            "x".into(),
            "general".into(),
            AgentKind::Claude,
            None,
            "/tmp/x".into(),
            parent,
            ResourceLimits::default(),
        );
        r.state = state;
        r
    }

    #[test]
    fn detect_parent_prefers_busy_instance() {
        let reg = InstanceRegistry::new();
        let root = make_record(None, InstanceState::Idle);
        let root_id = root.id.clone();
        reg.insert(root).unwrap();

        let mut busy = make_record(Some(root_id.clone()), InstanceState::Busy);
        busy.request_count = 1;
        let busy_id = busy.id.clone();
        reg.insert(busy).unwrap();

        assert_eq!(detect_parent(&reg), Some(busy_id));
    }

    #[test]
    fn detect_parent_falls_back_to_most_recently_active() {
        let reg = InstanceRegistry::new();
        let root = make_record(None, InstanceState::Idle);
        let root_id = root.id.clone();
        reg.insert(root).unwrap();

        let mut a = make_record(Some(root_id.clone()), InstanceState::Idle);
        a.request_count = 1;
        a.last_activity_at = Utc::now() - chrono::Duration::seconds(30);
        let a_id = a.id.clone();
        reg.insert(a).unwrap();

        let mut b = make_record(Some(root_id.clone()), InstanceState::Idle);
        b.request_count = 1;
        b.last_activity_at = Utc::now();
        let b_id = b.id.clone();
        reg.insert(b).unwrap();

        let detected = detect_parent(&reg).unwrap();
        assert_eq!(detected, b_id);
        assert_ne!(detected, a_id);
    }

    #[test]
    fn detect_parent_none_when_nothing_has_requested() {
        let reg = InstanceRegistry::new();
        reg.insert(make_record(None, InstanceState::Idle)).unwrap();
        assert_eq!(detect_parent(&reg), None);
    }
}
