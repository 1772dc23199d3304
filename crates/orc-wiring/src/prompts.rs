//! Role & Prompt Loader (SPEC_FULL.md §4.8): maps a role name to initial
//! system-prompt text, preferring a file on disk and falling back to a small
//! built-in dictionary. Failures here are never fatal to a spawn.

fn fallback_prompt(role: &str) -> &'static str {
    match role {
        "general" => "You are a general-purpose assistant collaborating with other agents.",
        "backend" => "You are a backend engineer focused on APIs, data models, and services.",
        "frontend" => "You are a frontend engineer focused on UI components and client behavior.",
        "reviewer" => "You are a code reviewer focused on correctness, security, and clarity.",
        "tester" => "You are a test engineer focused on coverage and edge cases.",
        "researcher" => "You are a researcher gathering and synthesizing information.",
        "architect" => "You are a systems architect focused on structure and tradeoffs.",
        "devops" => "You are a devops engineer focused on build, deploy, and infrastructure.",
        "security" => "You are a security engineer focused on threat modeling and hardening.",
        "docs" => "You are a technical writer focused on clear, accurate documentation.",
        _ => "You are an AI agent collaborating as part of a larger team.",
    }
}

/// Loads the prompt for `role` from `<prompts_dir>/<role>.txt`, trimmed, or
/// falls back to a built-in default for known (and unknown) roles.
pub async fn load_role_prompt(prompts_dir: &str, role: &str) -> String {
    let path = format!("{prompts_dir}/{role}.txt");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                fallback_prompt(role).to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => fallback_prompt(role).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_when_file_missing() {
        let prompt = load_role_prompt("/nonexistent/dir", "backend").await;
        assert!(prompt.contains("backend engineer"));
    }

    #[tokio::test]
    async fn unknown_role_gets_generic_fallback() {
        let prompt = load_role_prompt("/nonexistent/dir", "nonsense-role").await;
        assert!(prompt.contains("collaborating as part of a larger team"));
    }

    #[tokio::test]
    async fn reads_file_when_present() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("backend.txt"), "Custom backend prompt.\n")
            .await
            .unwrap();
        let prompt = load_role_prompt(dir.path().to_str().unwrap(), "backend").await;
        assert_eq!(prompt, "Custom backend prompt.");
    }
}
