//! Tool-Server Configurator (SPEC_FULL.md §4.2): materializes each spawned
//! agent's tool-server wiring, either as a config file (Claude) or a sequence
//! of keystroke-driven commands (Codex), and auto-injects the orchestrator's
//! own "self" server so the agent can call back in via the reply tool.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use orc_core::config::DaemonConfig;
use orc_core::types::AgentKind;
use orc_core::Error;
use orc_mux::tmux::Tmux;
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;

pub const SELF_SERVER_NAME: &str = "self";

#[derive(Debug, Clone)]
pub enum ToolServerEntry {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

#[derive(Debug, Clone)]
pub struct ToolServerSpec {
    pub name: String,
    pub entry: ToolServerEntry,
}

/// Builds the "self" server entry, carrying daemon bind coordinates and a
/// base64 shared auth key for the spawned subprocess to reconnect with.
pub fn self_server(kind: AgentKind, daemon: &DaemonConfig, auth_key: &str, gateway_url: &str) -> ToolServerSpec {
    let encoded_key = base64::engine::general_purpose::STANDARD.encode(auth_key.as_bytes());
    match kind {
        AgentKind::Codex => {
            let mut env = HashMap::new();
            env.insert("MADROX_TRANSPORT".to_string(), "stdio".to_string());
            if daemon.transport == "unix" {
                env.insert(
                    "MADROX_MANAGER_SOCKET".to_string(),
                    daemon.socket_path.clone().unwrap_or_default(),
                );
            } else {
                env.insert("MADROX_MANAGER_HOST".to_string(), daemon.host.clone());
                env.insert("MADROX_MANAGER_PORT".to_string(), daemon.port.to_string());
            }
            env.insert("MADROX_MANAGER_AUTHKEY".to_string(), encoded_key);
            ToolServerSpec {
                name: SELF_SERVER_NAME.to_string(),
                entry: ToolServerEntry::Stdio {
                    command: std::env::current_exe()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|_| "orchestratord".to_string()),
                    args: vec!["mcp-stdio".to_string()],
                    env,
                },
            }
        }
        AgentKind::Claude => ToolServerSpec {
            name: SELF_SERVER_NAME.to_string(),
            entry: ToolServerEntry::Http {
                url: gateway_url.to_string(),
            },
        },
    }
}

/// Ensures a "self" entry exists in `servers`, appending one via `self_server`
/// if the caller didn't already include one.
pub fn with_self_injected(
    mut servers: Vec<ToolServerSpec>,
    kind: AgentKind,
    daemon: &DaemonConfig,
    auth_key: &str,
    gateway_url: &str,
) -> Vec<ToolServerSpec> {
    if !servers.iter().any(|s| s.name == SELF_SERVER_NAME) {
        servers.push(self_server(kind, daemon, auth_key, gateway_url));
    }
    servers
}

#[derive(Serialize)]
#[serde(untagged)]
enum ClaudeMcpEntry {
    Stdio {
        command: String,
        args: Vec<String>,
        #[serde(skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
    Http {
        #[serde(rename = "type")]
        kind: &'static str,
        url: String,
    },
}

/// Writes `.claude_mcp_config.json` into the workspace and returns its path.
pub async fn configure_claude(
    workspace_path: &str,
    servers: &[ToolServerSpec],
) -> Result<String, Error> {
    let mut mcp_servers = serde_json::Map::new();
    for spec in servers {
        let entry = match &spec.entry {
            ToolServerEntry::Stdio { command, args, env } => ClaudeMcpEntry::Stdio {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
            },
            ToolServerEntry::Http { url } => ClaudeMcpEntry::Http {
                kind: "http",
                url: url.clone(),
            },
        };
        mcp_servers.insert(spec.name.clone(), serde_json::to_value(entry)?);
    }

    let doc = Value::Object(
        [("mcpServers".to_string(), Value::Object(mcp_servers))]
            .into_iter()
            .collect(),
    );

    let path = format!("{workspace_path}/.claude_mcp_config.json");
    tokio::fs::write(&path, serde_json::to_string_pretty(&doc)?)
        .await
        .map_err(Error::from)?;
    Ok(path)
}

/// Drives `codex mcp add …` commands over the pane for stdio servers, and
/// merges http servers into the user-level `~/.codex/config.toml`.
pub async fn configure_codex(
    tmux: &Tmux,
    pane: &str,
    servers: &[ToolServerSpec],
) -> Result<(), Error> {
    for spec in servers {
        match &spec.entry {
            ToolServerEntry::Stdio { command, args, env } => {
                let mut cmd = format!("codex mcp add {} {}", spec.name, command);
                for arg in args {
                    cmd.push(' ');
                    cmd.push_str(arg);
                }
                for (k, v) in env {
                    cmd.push_str(&format!(" --env {k}={v}"));
                }
                tmux.send_line(pane, &cmd, true).await?;
                sleep(Duration::from_millis(200)).await;
            }
            ToolServerEntry::Http { url } => {
                merge_codex_http_config(&spec.name, url).await?;
                sleep(Duration::from_millis(50)).await;
            }
        }
    }
    Ok(())
}

async fn merge_codex_http_config(name: &str, url: &str) -> Result<(), Error> {
    let home = std::env::var("HOME").unwrap_or_default();
    let config_path = format!("{home}/.codex/config.toml");

    let mut doc: toml::Value = match tokio::fs::read_to_string(&config_path).await {
        Ok(s) => toml::from_str(&s).unwrap_or(toml::Value::Table(Default::default())),
        Err(_) => toml::Value::Table(Default::default()),
    };

    let table = doc
        .as_table_mut()
        .ok_or_else(|| Error::ToolWiringError("~/.codex/config.toml is not a table".into()))?;
    let mcp_servers = table
        .entry("mcp_servers")
        .or_insert_with(|| toml::Value::Table(Default::default()));
    let mcp_table = mcp_servers
        .as_table_mut()
        .ok_or_else(|| Error::ToolWiringError("mcp_servers is not a table".into()))?;

    let mut entry = toml::map::Map::new();
    entry.insert("type".to_string(), toml::Value::String("http".to_string()));
    entry.insert("url".to_string(), toml::Value::String(url.to_string()));
    mcp_table.insert(name.to_string(), toml::Value::Table(entry));

    if let Some(parent) = std::path::Path::new(&config_path).parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let rendered = toml::to_string_pretty(&doc).map_err(|e| Error::ToolWiringError(e.to_string()))?;
    tokio::fs::write(&config_path, rendered).await.map_err(Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configure_claude_writes_stdio_without_type_field() {
        let dir = tempfile::tempdir().unwrap();
        let servers = vec![ToolServerSpec {
            name: "self".to_string(),
            entry: ToolServerEntry::Stdio {
                command: "orchestratord".to_string(),
                args: vec!["mcp-stdio".to_string()],
                env: HashMap::new(),
            },
        }];
        let path = configure_claude(dir.path().to_str().unwrap(), &servers)
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let json: Value = serde_json::from_str(&contents).unwrap();
        let entry = &json["mcpServers"]["self"];
        assert!(entry.get("type").is_none());
        assert_eq!(entry["command"], "orchestratord");
    }

    #[tokio::test]
    async fn configure_claude_writes_http_with_type_field() {
        let dir = tempfile::tempdir().unwrap();
        let servers = vec![ToolServerSpec {
            name: "self".to_string(),
            entry: ToolServerEntry::Http {
                url: "http://127.0.0.1:8765".to_string(),
            },
        }];
        let path = configure_claude(dir.path().to_str().unwrap(), &servers)
            .await
            .unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let json: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["mcpServers"]["self"]["type"], "http");
    }

    #[test]
    fn with_self_injected_does_not_duplicate() {
        let daemon = DaemonConfig::default();
        let servers = vec![ToolServerSpec {
            name: "self".to_string(),
            entry: ToolServerEntry::Http {
                url: "http://x".to_string(),
            },
        }];
        let out = with_self_injected(servers, AgentKind::Claude, &daemon, "k", "http://y");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn self_server_for_codex_carries_base64_authkey() {
        let daemon = DaemonConfig::default();
        let spec = self_server(AgentKind::Codex, &daemon, "secret", "http://x");
        match spec.entry {
            ToolServerEntry::Stdio { env, .. } => {
                let encoded = env.get("MADROX_MANAGER_AUTHKEY").unwrap();
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .unwrap();
                assert_eq!(decoded, b"secret");
            }
            _ => panic!("expected stdio entry for codex"),
        }
    }
}
