//! RPC dispatch table (SPEC_FULL.md §6): a static `name → handler` map shared
//! by both transports, following `agenticlaw-gateway::rpc::route_rpc`'s
//! per-method handler shape. Each handler extracts its own params and returns
//! a JSON value or a structured error.

use std::collections::HashMap;
use std::time::Duration;

use orc_core::protocol;
use orc_core::types::{
    AgentKind, CoordinationKind, InstanceId, ResourceLimits,
};
use orc_core::Error;
use orc_registry::lifecycle::{self, SpawnRequest};
use orc_registry::team;
use orc_wiring::mcp_config::{ToolServerEntry, ToolServerSpec};
use serde_json::Value;

use crate::state::AppState;

const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

/// Error variants a handler can return, kept distinct from `orc_core::Error`
/// so malformed-request problems map to the right JSON-RPC code rather than
/// being folded into `-32000` application errors.
pub enum RpcError {
    MethodNotFound(String),
    InvalidParams(String),
    App(Error),
}

impl From<Error> for RpcError {
    fn from(e: Error) -> Self {
        RpcError::App(e)
    }
}

pub type RpcResult = Result<Value, RpcError>;

pub fn to_response(id: Value, result: RpcResult) -> protocol::RpcResponse {
    match result {
        Ok(value) => protocol::RpcResponse::ok(id, value),
        Err(RpcError::MethodNotFound(method)) => protocol::RpcResponse::method_not_found(id, &method),
        Err(RpcError::InvalidParams(msg)) => protocol::RpcResponse::invalid_params(id, msg),
        Err(RpcError::App(e)) => protocol::RpcResponse::from_error(id, &e),
    }
}

/// Dispatches one RPC call. Shared verbatim by the HTTP and stdio transports.
pub async fn dispatch(method: &str, params: Value, state: &AppState) -> RpcResult {
    match method {
        "spawn" => handle_spawn(params, state).await,
        "send_to_instance" => handle_send_to_instance(params, state).await,
        "get_instance_output" => handle_get_instance_output(params, state).await,
        "coordinate_instances" => handle_coordinate_instances(params, state).await,
        "terminate_instance" => handle_terminate_instance(params, state).await,
        "get_instance_status" => handle_get_instance_status(params, state).await,
        "reply_to_caller" => handle_reply_to_caller(params, state).await,
        "interrupt_instance" => handle_interrupt_instance(params, state).await,
        "broadcast_to_children" => handle_broadcast_to_children(params, state).await,
        "spawn_team_from_template" => handle_spawn_team_from_template(params, state).await,
        "get_audit_logs" => handle_get_audit_logs(params, state).await,
        other => Err(RpcError::MethodNotFound(other.to_string())),
    }
}

fn require_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, RpcError> {
    params[field]
        .as_str()
        .ok_or_else(|| RpcError::InvalidParams(format!("missing required param: {field}")))
}

fn optional_str(params: &Value, field: &str) -> Option<String> {
    params[field].as_str().map(str::to_string)
}

fn optional_bool(params: &Value, field: &str, default: bool) -> bool {
    params[field].as_bool().unwrap_or(default)
}

fn optional_u64(params: &Value, field: &str, default: u64) -> u64 {
    params[field].as_u64().unwrap_or(default)
}

fn parse_instance_id(params: &Value, field: &str) -> Result<InstanceId, RpcError> {
    Ok(InstanceId::from(require_str(params, field)?))
}

fn parse_agent_kind(params: &Value) -> Result<AgentKind, RpcError> {
    match params["kind"].as_str() {
        Some("claude") | None => Ok(AgentKind::Claude),
        Some("codex") => Ok(AgentKind::Codex),
        Some(other) => Err(RpcError::InvalidParams(format!("unknown kind: {other}"))),
    }
}

fn parse_resource_limits(params: &Value) -> ResourceLimits {
    let v = &params["resource_limits"];
    ResourceLimits {
        max_tokens: v["max_tokens"].as_u64(),
        max_cost: v["max_cost"].as_f64(),
        timeout_minutes: v["timeout_minutes"].as_u64(),
    }
}

fn parse_tool_servers(params: &Value) -> Vec<ToolServerSpec> {
    let Some(arr) = params["tool_server_wiring"].as_array() else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|entry| {
            let name = entry["name"].as_str()?.to_string();
            let entry = match entry["type"].as_str() {
                Some("http") => ToolServerEntry::Http {
                    url: entry["url"].as_str()?.to_string(),
                },
                _ => {
                    let command = entry["command"].as_str()?.to_string();
                    let args = entry["args"]
                        .as_array()
                        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                        .unwrap_or_default();
                    let env = entry["env"]
                        .as_object()
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                                .collect()
                        })
                        .unwrap_or_default();
                    ToolServerEntry::Stdio { command, args, env }
                }
            };
            Some(ToolServerSpec { name, entry })
        })
        .collect()
}

fn record_to_json(record: &orc_core::types::InstanceRecord) -> Value {
    serde_json::json!({
        "id": record.id.as_str(),
        "display_name": record.display_name,
        "role": record.role,
        "kind": record.kind.to_string(),
        "model": record.model,
        "state": record.state.to_string(),
        "workspace_path": record.workspace_path,
        "created_at": record.created_at,
        "last_activity_at": record.last_activity_at,
        "parent_id": record.parent_id.as_ref().map(|p| p.as_str().to_string()),
        "children": record.children.iter().map(|c| c.as_str().to_string()).collect::<Vec<_>>(),
        "cumulative_tokens": record.cumulative_tokens,
        "cumulative_cost": record.cumulative_cost,
        "request_count": record.request_count,
        "error_message": record.error_message,
    })
}

async fn handle_spawn(params: Value, state: &AppState) -> RpcResult {
    let role = require_str(&params, "role")?.to_string();
    let kind = parse_agent_kind(&params)?;
    let parent_id = optional_str(&params, "parent_id").map(InstanceId::from);

    let req = SpawnRequest {
        name: optional_str(&params, "name"),
        role,
        kind,
        model: optional_str(&params, "model"),
        system_prompt: optional_str(&params, "system_prompt"),
        initial_prompt: optional_str(&params, "initial_prompt"),
        parent_id,
        resource_limits: parse_resource_limits(&params),
        wait_for_ready: optional_bool(&params, "wait_for_ready", true),
        tool_servers: parse_tool_servers(&params),
    };

    let id = lifecycle::spawn(
        &state.registry,
        state.tmux,
        state.config.max_concurrent_instances,
        &state.config.workspace_base_dir,
        &state.prompts_dir,
        &state.config.daemon,
        state.auth.token(),
        &state.gateway_url,
        req,
    )
    .await?;

    state.audit.record(
        "instance_spawn",
        Some(id.as_str()),
        serde_json::json!({ "kind": kind.to_string() }),
    );

    let record = state.registry.get(&id).ok_or_else(|| Error::instance_not_found(id.as_str()))?;
    Ok(serde_json::json!({ "success": true, "instance": record_to_json(&record) }))
}

async fn handle_send_to_instance(params: Value, state: &AppState) -> RpcResult {
    let recipient_id = parse_instance_id(&params, "instance_id")?;
    let message = require_str(&params, "message")?;
    let wait_for_response = optional_bool(&params, "wait_for_response", true);
    let timeout = Duration::from_secs(optional_u64(&params, "timeout_seconds", DEFAULT_SEND_TIMEOUT_SECS));

    let daemon = state.daemon.read().await.clone();
    let outcome = orc_broker::broker::send(
        &state.registry,
        &state.tmux,
        daemon.as_ref(),
        "coordinator",
        &recipient_id,
        message,
        wait_for_response,
        timeout,
    )
    .await?;

    Ok(serde_json::json!({
        "success": true,
        "protocol": outcome.protocol,
        "status": outcome.status,
        "correlation_id": outcome.correlation_id,
        "response": outcome.response,
    }))
}

async fn handle_get_instance_output(params: Value, state: &AppState) -> RpcResult {
    let id = parse_instance_id(&params, "instance_id")?;
    let record = state.registry.get(&id).ok_or_else(|| Error::instance_not_found(id.as_str()))?;
    let raw = state
        .tmux
        .capture_pane(&record.display_name, orc_mux::tmux::CaptureMode::LastN(200))
        .await?;
    let extracted = orc_mux::extract::extract_response(&raw, None);
    Ok(serde_json::json!({ "success": true, "instance_id": id.as_str(), "output": extracted }))
}

async fn handle_coordinate_instances(params: Value, state: &AppState) -> RpcResult {
    let coordinator_id = require_str(&params, "coordinator_id")?.to_string();
    let task_description = require_str(&params, "task_description")?;
    let participant_ids: Vec<InstanceId> = params["participant_ids"]
        .as_array()
        .ok_or_else(|| RpcError::InvalidParams("missing required param: participant_ids".to_string()))?
        .iter()
        .filter_map(|v| v.as_str().map(InstanceId::from))
        .collect();
    if participant_ids.is_empty() {
        return Err(RpcError::InvalidParams("participant_ids must be non-empty".to_string()));
    }
    let kind = match params["kind"].as_str() {
        Some("parallel") => CoordinationKind::Parallel,
        Some("consensus") => CoordinationKind::Consensus,
        _ => CoordinationKind::Sequential,
    };
    let timeout = Duration::from_secs(optional_u64(&params, "timeout_seconds", DEFAULT_SEND_TIMEOUT_SECS));

    let daemon = state.daemon.read().await.clone();
    let task = orc_broker::broker::coordinate(
        &state.registry,
        &state.tmux,
        daemon.as_ref(),
        &coordinator_id,
        participant_ids,
        kind,
        task_description,
        timeout,
    )
    .await;

    Ok(serde_json::json!({
        "success": true,
        "task_id": task.task_id,
        "status": format!("{:?}", task.status).to_lowercase(),
        "results": task.results,
    }))
}

async fn handle_terminate_instance(params: Value, state: &AppState) -> RpcResult {
    let id = parse_instance_id(&params, "instance_id")?;
    let force = optional_bool(&params, "force", false);
    let daemon = state.daemon.read().await.clone();
    let sub_errors = lifecycle::terminate(
        &state.registry,
        &state.tmux,
        daemon.as_ref(),
        &id,
        force,
        &state.config.artifacts_dir,
        state.config.preserve_artifacts,
    )
    .await?;
    state.audit.record(
        "instance_terminate",
        Some(id.as_str()),
        serde_json::json!({ "force": force, "sub_errors": sub_errors.len() }),
    );
    Ok(serde_json::json!({
        "success": true,
        "instance_id": id.as_str(),
        "sub_errors": sub_errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    }))
}

async fn handle_get_instance_status(params: Value, state: &AppState) -> RpcResult {
    match optional_str(&params, "instance_id") {
        Some(raw_id) => {
            let id = InstanceId::from(raw_id);
            let record = state.registry.get(&id).ok_or_else(|| Error::instance_not_found(id.as_str()))?;
            let pane_health = orc_supervisor::instance_health::check_pane(&state.tmux, &record.display_name).await?;
            Ok(serde_json::json!({
                "success": true,
                "instance": record_to_json(&record),
                "pane_health": pane_health,
            }))
        }
        None => {
            let instances: Vec<Value> = state.registry.list_all().iter().map(record_to_json).collect();
            Ok(serde_json::json!({ "success": true, "instances": instances }))
        }
    }
}

async fn handle_reply_to_caller(params: Value, state: &AppState) -> RpcResult {
    let instance_id = parse_instance_id(&params, "instance_id")?;
    let reply_message = require_str(&params, "reply_message")?;
    let correlation_id = optional_str(&params, "correlation_id");

    let daemon = state.daemon.read().await.clone();
    let (destination, correlation_id) = orc_broker::broker::reply_to_caller(
        &state.registry,
        daemon.as_ref(),
        &instance_id,
        reply_message,
        correlation_id.as_deref(),
    )
    .await?;

    Ok(serde_json::json!({ "success": true, "delivered_to": destination, "correlation_id": correlation_id }))
}

async fn handle_interrupt_instance(params: Value, state: &AppState) -> RpcResult {
    let id = parse_instance_id(&params, "instance_id")?;
    let confirmed = lifecycle::interrupt(&state.registry, &state.tmux, &id).await?;
    Ok(serde_json::json!({ "success": true, "instance_id": id.as_str(), "confirmed": confirmed }))
}

async fn handle_broadcast_to_children(params: Value, state: &AppState) -> RpcResult {
    let parent_id = parse_instance_id(&params, "parent_id")?;
    let message = require_str(&params, "message")?;
    let wait_for_response = optional_bool(&params, "wait_for_response", true);
    let timeout = Duration::from_secs(optional_u64(&params, "timeout_seconds", DEFAULT_SEND_TIMEOUT_SECS));

    let daemon = state.daemon.read().await.clone();
    let results: HashMap<String, Result<orc_broker::broker::SendOutcome, String>> =
        orc_broker::broker::broadcast_to_children(
            &state.registry,
            &state.tmux,
            daemon.as_ref(),
            &parent_id,
            message,
            wait_for_response,
            timeout,
        )
        .await;

    let rendered: HashMap<String, Value> = results
        .into_iter()
        .map(|(id, outcome)| {
            let value = match outcome {
                Ok(o) => serde_json::json!({
                    "protocol": o.protocol, "status": o.status, "response": o.response,
                }),
                Err(e) => serde_json::json!({ "error": e }),
            };
            (id, value)
        })
        .collect();

    Ok(serde_json::json!({ "success": true, "results": rendered }))
}

async fn handle_spawn_team_from_template(params: Value, state: &AppState) -> RpcResult {
    let template_name = require_str(&params, "template_name")?;
    let task_description = require_str(&params, "task_description")?;

    let result = team::spawn_team_from_template(
        &state.registry,
        state.tmux,
        state.config.max_concurrent_instances,
        &state.config.workspace_base_dir,
        &state.prompts_dir,
        &state.templates_dir,
        &state.config.daemon,
        state.auth.token(),
        &state.gateway_url,
        template_name,
        task_description,
    )
    .await?;

    state.audit.record(
        "team_spawn",
        Some(result.supervisor_id.as_str()),
        serde_json::json!({ "template_name": template_name, "worker_count": result.worker_ids.len() }),
    );

    Ok(serde_json::json!({
        "success": true,
        "supervisor_id": result.supervisor_id.as_str(),
        "worker_ids": result.worker_ids.iter().map(|id| id.as_str().to_string()).collect::<Vec<_>>(),
        "instructions": result.instructions,
    }))
}

async fn handle_get_audit_logs(params: Value, state: &AppState) -> RpcResult {
    let instance_id = optional_str(&params, "instance_id");
    let event_type = optional_str(&params, "event_type");
    let since = optional_str(&params, "since").and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&chrono::Utc));

    let events = state
        .audit
        .query(instance_id.as_deref(), event_type.as_deref(), since);
    Ok(serde_json::json!({ "success": true, "events": events }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_unknown_method_is_method_not_found() {
        let err = RpcError::MethodNotFound("bogus".to_string());
        match err {
            RpcError::MethodNotFound(m) => assert_eq!(m, "bogus"),
            _ => panic!("expected MethodNotFound"),
        }
    }

    #[test]
    fn require_str_missing_field_is_invalid_params() {
        let params = serde_json::json!({ "other": "x" });
        let err = require_str(&params, "role").unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));
    }

    #[test]
    fn require_str_rejects_non_string_value() {
        let params = serde_json::json!({ "role": 42 });
        assert!(require_str(&params, "role").is_err());
    }

    #[test]
    fn optional_bool_falls_back_to_default() {
        let params = serde_json::json!({});
        assert!(optional_bool(&params, "wait_for_ready", true));
        assert!(!optional_bool(&params, "force", false));
    }

    #[test]
    fn parse_agent_kind_defaults_to_claude() {
        let params = serde_json::json!({});
        assert_eq!(parse_agent_kind(&params).unwrap(), AgentKind::Claude);
    }

    #[test]
    fn parse_agent_kind_accepts_codex() {
        let params = serde_json::json!({ "kind": "codex" });
        assert_eq!(parse_agent_kind(&params).unwrap(), AgentKind::Codex);
    }

    #[test]
    fn parse_agent_kind_rejects_unknown() {
        let params = serde_json::json!({ "kind": "gpt" });
        assert!(parse_agent_kind(&params).is_err());
    }

    #[test]
    fn parse_resource_limits_defaults_when_absent() {
        let params = serde_json::json!({});
        let limits = parse_resource_limits(&params);
        assert_eq!(limits.max_tokens, None);
        assert_eq!(limits.max_cost, None);
        assert_eq!(limits.timeout_minutes, None);
    }

    #[test]
    fn parse_tool_servers_builds_http_and_stdio_entries() {
        let params = serde_json::json!({
            "tool_server_wiring": [
                { "name": "web", "type": "http", "url": "http://localhost:9000" },
                { "name": "fs", "command": "mcp-fs", "args": ["--root", "/tmp"] },
            ]
        });
        let specs = parse_tool_servers(&params);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "web");
        assert!(matches!(specs[0].entry, ToolServerEntry::Http { .. }));
        assert_eq!(specs[1].name, "fs");
        assert!(matches!(specs[1].entry, ToolServerEntry::Stdio { .. }));
    }

    #[test]
    fn parse_tool_servers_empty_when_field_absent() {
        let params = serde_json::json!({});
        assert!(parse_tool_servers(&params).is_empty());
    }
}
