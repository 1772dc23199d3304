//! Configuration loading: a TOML-deserializable `OrchestratorConfig` with
//! per-field defaults, plus the env-var fallback chains used for secrets
//! that should never live in a committed config file (mirrors the resolution
//! chain `agenticlaw-gateway::server::start_gateway` uses for its auth token).

use serde::{Deserialize, Serialize};

fn default_bind_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8765
}

fn default_max_concurrent_instances() -> usize {
    32
}

fn default_workspace_base_dir() -> String {
    "/tmp/orchestratord/workspaces".to_string()
}

fn default_artifacts_dir() -> String {
    "/tmp/orchestratord/artifacts".to_string()
}

fn default_log_dir() -> String {
    "/tmp/orchestratord/logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_ring_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// `"tcp"` (with `host`/`port`) or `"unix"` (with `socket_path`).
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub socket_path: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            transport: "tcp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8766,
            socket_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub max_concurrent_instances: usize,
    pub workspace_base_dir: String,
    pub artifacts_dir: String,
    pub preserve_artifacts: bool,
    pub log_dir: String,
    pub log_level: String,
    pub audit_ring_capacity: usize,
    pub daemon: DaemonConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            bind_host: default_bind_host(),
            bind_port: default_bind_port(),
            max_concurrent_instances: default_max_concurrent_instances(),
            workspace_base_dir: default_workspace_base_dir(),
            artifacts_dir: default_artifacts_dir(),
            preserve_artifacts: false,
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            audit_ring_capacity: default_audit_ring_capacity(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads a TOML config file, falling back to all defaults if the path is
    /// unset or unreadable (config errors here are non-fatal: a missing file
    /// just means "use the baked-in defaults").
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let cfg: OrchestratorConfig =
                    toml::from_str(&contents).map_err(|e| crate::Error::Config(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Resolves the shared authentication key for the daemon/RPC surface from the
/// environment, trying each variable name in turn.
pub fn resolve_auth_key() -> Option<String> {
    for var in [
        "ORCHESTRATORD_AUTH_KEY",
        "ORC_AUTH_KEY",
        "MADROX_MANAGER_AUTHKEY",
    ] {
        if let Ok(v) = std::env::var(var) {
            if !v.is_empty() {
                return Some(v);
            }
        }
    }
    None
}

pub fn resolve_anthropic_api_key() -> Option<String> {
    std::env::var("ANTHROPIC_API_KEY").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.bind_port, 8765);
        assert_eq!(cfg.max_concurrent_instances, 32);
        assert!(!cfg.preserve_artifacts);
    }

    #[test]
    fn load_falls_back_to_defaults_when_path_missing() {
        let cfg = OrchestratorConfig::load(Some("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(cfg.bind_port, default_bind_port());
    }

    #[test]
    fn load_parses_partial_toml_with_defaults_for_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "bind_port = 9999\n").unwrap();
        let cfg = OrchestratorConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.bind_port, 9999);
        assert_eq!(cfg.max_concurrent_instances, default_max_concurrent_instances());
    }
}
