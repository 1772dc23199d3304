//! Per-instance health (SPEC_FULL.md §4.7.2/§4.7.3): a periodic sweep that
//! enforces resource limits, and a point-in-time pane health check exposed to
//! the gateway's `get_instance_status` RPC.

use std::sync::Arc;
use std::time::Duration;

use orc_core::types::InstanceId;
use orc_core::Error;
use orc_mux::tmux::Tmux;
use orc_registry::registry::InstanceRegistry;
use serde::Serialize;

use crate::audit::AuditLog;

#[derive(Debug, Clone, Serialize)]
pub struct PaneHealth {
    pub healthy: bool,
    pub process_id: Option<u32>,
    pub process_status: Option<String>,
}

/// Checks whether the instance's tmux pane is alive and has a live process
/// attached. Does not touch the registry — callers fold this into a richer
/// status response alongside the registry record.
pub async fn check_pane(tmux: &Tmux, display_name: &str) -> Result<PaneHealth, Error> {
    let exists = tmux.session_exists(display_name).await;
    if !exists {
        return Ok(PaneHealth {
            healthy: false,
            process_id: None,
            process_status: Some("session not found".to_string()),
        });
    }

    let pid = tmux.pane_pid(display_name).await?;
    let active = tmux.pane_active(display_name).await?;
    Ok(PaneHealth {
        healthy: pid.is_some() && active,
        process_id: pid,
        process_status: Some(if active { "active".to_string() } else { "inactive".to_string() }),
    })
}

/// Runs `orc_registry::lifecycle::sweep_resource_limits` on an interval,
/// recording an audit event for every instance it terminates.
#[allow(clippy::too_many_arguments)]
pub async fn run_resource_sweep(
    registry: Arc<InstanceRegistry>,
    tmux: Tmux,
    daemon: Arc<tokio::sync::RwLock<Arc<dyn orc_core::daemon::SharedStateDaemon>>>,
    audit: Arc<AuditLog>,
    artifacts_dir: String,
    preserve_artifacts: bool,
    interval: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let daemon = daemon.read().await.clone();
        let terminated: Vec<InstanceId> = orc_registry::lifecycle::sweep_resource_limits(
            &registry,
            &tmux,
            daemon.as_ref(),
            &artifacts_dir,
            preserve_artifacts,
        )
        .await;
        for id in terminated {
            audit.record(
                "resource_limit_exceeded",
                Some(id.as_str()),
                serde_json::json!({ "action": "terminated" }),
            );
        }
    }
}

/// Per-session usage log filename convention: if present in an instance's
/// workspace, its contents are folded into the instance's token/cost
/// counters as enrichment (SPEC_FULL.md §4.11).
const USAGE_LOG_FILENAME: &str = "usage.jsonl";

/// Usage-enrichment sweep (SPEC_FULL.md §4.11/§4.12): tails each
/// non-terminated instance's usage log, if any, through the Position Tracker
/// and folds new bytes into its cumulative counters. The position store is
/// loaded once and persisted to disk after every pass.
pub async fn run_usage_enrichment_sweep(
    registry: Arc<InstanceRegistry>,
    position_store_path: String,
    interval: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    let mut store = orc_broker::position::load(&position_store_path).await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        for record in registry.list_all() {
            if record.state.is_terminal() {
                continue;
            }
            let log_path = format!("{}/{USAGE_LOG_FILENAME}", record.workspace_path);
            match orc_broker::position::read_new_bytes(&mut store, record.id.as_str(), "usage", &log_path).await {
                Ok(bytes) if !bytes.is_empty() => {
                    if let Err(e) = orc_broker::usage::apply_usage_log_bytes(&registry, &record.id, &bytes) {
                        tracing::warn!(instance_id = %record.id, error = %e, "usage enrichment failed");
                    }
                }
                Ok(_) => {}
                Err(_) => {
                    // No usage log for this instance (or it's unreadable this
                    // pass) — normal and silent, per SPEC_FULL.md §4.11.
                }
            }
        }

        if let Err(e) = orc_broker::position::save(&position_store_path, &store).await {
            tracing::warn!(error = %e, "failed to persist position store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pane_health_serializes_with_expected_fields() {
        let health = PaneHealth {
            healthy: false,
            process_id: None,
            process_status: Some("session not found".to_string()),
        };
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["healthy"], false);
        assert_eq!(value["process_status"], "session not found");
    }
}
