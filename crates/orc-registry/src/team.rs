//! Template Team Spawner (SPEC_FULL.md §4.10): parses a free-text team
//! template and extracts a small set of directives, falling back to defaults
//! on anything it can't parse — malformed templates degrade gracefully
//! rather than failing the spawn.

use std::sync::Arc;

use orc_core::config::DaemonConfig;
use orc_core::types::{AgentKind, InstanceId, ResourceLimits};
use orc_core::Error;
use orc_mux::tmux::Tmux;
use regex::Regex;

use crate::lifecycle::{self, SpawnRequest};
use crate::registry::InstanceRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamTemplate {
    pub team_size: u32,
    pub duration: String,
    pub supervisor_role: String,
}

impl Default for TeamTemplate {
    fn default() -> Self {
        TeamTemplate {
            team_size: 6,
            duration: "2-4 hours".to_string(),
            supervisor_role: "general".to_string(),
        }
    }
}

fn supervisor_role_for_heading(heading: &str) -> Option<&'static str> {
    let lower = heading.to_lowercase();
    if lower.contains("technical lead") {
        Some("architect")
    } else if lower.contains("research lead") {
        Some("researcher")
    } else if lower.contains("security lead") {
        Some("security")
    } else if lower.contains("data engineering lead") {
        Some("backend")
    } else {
        None
    }
}

/// Parses `template_text`, returning defaults for anything not found.
pub fn parse_template(template_text: &str) -> TeamTemplate {
    let mut template = TeamTemplate::default();

    if let Ok(re) = Regex::new(r"(?i)team[_ ]size\s*[:=]\s*(\d+)") {
        if let Some(caps) = re.captures(template_text) {
            if let Ok(n) = caps[1].parse::<u32>() {
                template.team_size = n;
            }
        }
    }

    if let Ok(re) = Regex::new(r"(?i)duration\s*[:=]\s*([^\n]+)") {
        if let Some(caps) = re.captures(template_text) {
            template.duration = caps[1].trim().to_string();
        }
    }

    for line in template_text.lines() {
        if let Some(role) = supervisor_role_for_heading(line) {
            template.supervisor_role = role.to_string();
            break;
        }
    }

    template
}

/// Reads `<templates_dir>/<name>.md` (falling back to `.txt`), returning an
/// empty string on any read failure — `parse_template` turns that into all
/// defaults, which is the documented graceful-degradation behavior.
pub async fn load_template_text(templates_dir: &str, name: &str) -> String {
    for ext in ["md", "txt"] {
        let path = format!("{templates_dir}/{name}.{ext}");
        if let Ok(text) = tokio::fs::read_to_string(&path).await {
            return text;
        }
    }
    tracing::warn!(name, "team template not found, using all defaults");
    String::new()
}

pub struct TeamSpawnResult {
    pub supervisor_id: InstanceId,
    pub worker_ids: Vec<InstanceId>,
    pub instructions: String,
}

/// Spawns a supervisor instance under the template's `supervisor_role`, then
/// `team_size - 1` general-purpose workers parented to it (SPEC_FULL.md §4.10).
#[allow(clippy::too_many_arguments)]
pub async fn spawn_team_from_template(
    registry: &Arc<InstanceRegistry>,
    tmux: Tmux,
    max_concurrent: usize,
    workspace_base_dir: &str,
    prompts_dir: &str,
    templates_dir: &str,
    daemon_config: &DaemonConfig,
    auth_key: &str,
    gateway_url: &str,
    template_name: &str,
    task_description: &str,
) -> Result<TeamSpawnResult, Error> {
    let template_text = load_template_text(templates_dir, template_name).await;
    let template = parse_template(&template_text);

    let supervisor_id = lifecycle::spawn(
        registry,
        tmux,
        max_concurrent,
        workspace_base_dir,
        prompts_dir,
        daemon_config,
        auth_key,
        gateway_url,
        SpawnRequest {
            name: None,
            role: template.supervisor_role.clone(),
            kind: AgentKind::Claude,
            model: None,
            system_prompt: None,
            initial_prompt: Some(format!(
                "You are leading a team of {} for the next {}. Task: {task_description}",
                template.team_size, template.duration
            )),
            parent_id: None,
            resource_limits: ResourceLimits::default(),
            wait_for_ready: true,
            tool_servers: Vec::new(),
        },
    )
    .await?;

    let mut worker_ids = Vec::new();
    for _ in 0..template.team_size.saturating_sub(1) {
        let worker_id = lifecycle::spawn(
            registry,
            tmux,
            max_concurrent,
            workspace_base_dir,
            prompts_dir,
            daemon_config,
            auth_key,
            gateway_url,
            SpawnRequest {
                name: None,
                role: "general".to_string(),
                kind: AgentKind::Claude,
                model: None,
                system_prompt: None,
                initial_prompt: None,
                parent_id: Some(supervisor_id.clone()),
                resource_limits: ResourceLimits::default(),
                wait_for_ready: false,
                tool_servers: Vec::new(),
            },
        )
        .await?;
        worker_ids.push(worker_id);
    }

    let instructions = format!(
        "Team spawned under supervisor `{supervisor_id}` ({}), {} worker(s), expected duration {}.",
        template.supervisor_role,
        worker_ids.len(),
        template.duration
    );

    Ok(TeamSpawnResult {
        supervisor_id,
        worker_ids,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_fields() {
        let text = "team_size: 4\nduration: 1-2 hours\n## Security Lead\nharden the service";
        let t = parse_template(text);
        assert_eq!(t.team_size, 4);
        assert_eq!(t.duration, "1-2 hours");
        assert_eq!(t.supervisor_role, "security");
    }

    #[test]
    fn falls_back_to_defaults_on_empty_template() {
        let t = parse_template("");
        assert_eq!(t, TeamTemplate::default());
    }

    #[test]
    fn unknown_heading_keeps_general_role() {
        let t = parse_template("## Marketing Lead\ndo marketing");
        assert_eq!(t.supervisor_role, "general");
    }

    #[tokio::test]
    async fn load_template_text_falls_back_to_empty_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let text = load_template_text(dir.path().to_str().unwrap(), "nonexistent").await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn load_template_text_reads_md_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.md"), "team_size: 3").unwrap();
        let text = load_template_text(dir.path().to_str().unwrap(), "alpha").await;
        assert_eq!(text, "team_size: 3");
    }
}
