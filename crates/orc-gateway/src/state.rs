//! Shared application state handed to both transports (SPEC_FULL.md §6): the
//! registry, multiplexer handle, shared-state daemon client, audit log, and
//! the handful of directory paths the lifecycle/wiring layers need.

use std::sync::Arc;

use orc_broker::daemon_client::SharedStateDaemon;
use orc_core::config::OrchestratorConfig;
use orc_mux::tmux::Tmux;
use orc_registry::registry::InstanceRegistry;
use orc_supervisor::audit::AuditLog;
use tokio::sync::RwLock;

use crate::auth::GatewayAuth;

pub struct AppState {
    pub registry: Arc<InstanceRegistry>,
    pub tmux: Tmux,
    pub daemon: Arc<RwLock<Arc<dyn SharedStateDaemon>>>,
    pub audit: Arc<AuditLog>,
    pub auth: GatewayAuth,
    pub config: OrchestratorConfig,
    pub prompts_dir: String,
    pub templates_dir: String,
    pub gateway_url: String,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<InstanceRegistry>,
        tmux: Tmux,
        daemon: Arc<RwLock<Arc<dyn SharedStateDaemon>>>,
        audit: Arc<AuditLog>,
        auth: GatewayAuth,
        config: OrchestratorConfig,
        prompts_dir: String,
        templates_dir: String,
        gateway_url: String,
    ) -> Self {
        AppState {
            registry,
            tmux,
            daemon,
            audit,
            auth,
            config,
            prompts_dir,
            templates_dir,
            gateway_url,
        }
    }
}
