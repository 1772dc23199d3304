//! Summary Generator (SPEC_FULL.md §4.13): renders a Markdown activity digest
//! across tracked instances from their registry records and a snapshot of
//! their tmux pane content.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use orc_core::types::InstanceRecord;
use orc_mux::tmux::{CaptureMode, Tmux};
use orc_registry::registry::InstanceRegistry;

/// Looks for a `NN%` token in the last few lines of a pane capture, the way a
/// context-usage indicator typically appears in a status bar.
pub fn extract_context_pct(pane: &str) -> Option<u8> {
    let tail: Vec<&str> = pane.lines().rev().take(5).collect();
    for line in tail {
        for word in line.split_whitespace() {
            if let Some(num_str) = word.strip_suffix('%') {
                if let Ok(n) = num_str.parse::<u8>() {
                    if n <= 100 {
                        return Some(n);
                    }
                }
            }
        }
    }
    None
}

/// Rough one-line summary of what an instance is currently doing: the tail of
/// its pane, truncated to roughly 50 tokens.
pub fn extract_frontier_summary(pane: &str) -> Option<String> {
    let lines: Vec<&str> = pane.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return None;
    }

    let tail = &lines[lines.len().saturating_sub(10)..];
    let summary: String = tail.join(" ");

    if summary.len() > 250 {
        let boundary = summary
            .char_indices()
            .take_while(|(i, _)| *i <= 250)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        Some(format!("{}...", &summary[..boundary]))
    } else {
        Some(summary)
    }
}

/// Per-instance row of the activity digest. `context_pct` and
/// `frontier_summary` are best-effort: `None` means the pane couldn't be
/// scraped or carried no recognizable markers, not that the instance is idle.
pub struct ActivityRow {
    pub record: InstanceRecord,
    pub context_pct: Option<u8>,
    pub frontier_summary: Option<String>,
}

/// Renders the Markdown activity digest table. Rows are expected to already
/// be sorted by the caller (by display name, matching the registry's natural
/// ordering for readability).
pub fn render_markdown(rows: &[ActivityRow]) -> String {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let mut md = format!("# Instance Activity\n\nUpdated: {now}\n\n");
    md.push_str("| Instance | Role | State | Context% | Tokens | Frontier |\n");
    md.push_str("|----------|------|-------|----------|--------|----------|\n");

    for row in rows {
        let ctx = row
            .context_pct
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "-".to_string());
        let frontier = row.frontier_summary.as_deref().unwrap_or("-");
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            row.record.display_name, row.record.role, row.record.state, ctx, row.record.cumulative_tokens, frontier
        ));
    }

    md
}

/// Builds activity rows from the registry's current records and a fresh pane
/// capture of each, then writes `render_markdown`'s output to `output_path`
/// on an interval, overwriting the file each pass (SPEC_FULL.md §4.13).
pub async fn run_summary_sweep(
    registry: Arc<InstanceRegistry>,
    tmux: Tmux,
    output_path: String,
    interval: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let mut records = registry.list_all();
        records.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let pane = tmux
                .capture_pane(&record.display_name, CaptureMode::LastN(40))
                .await
                .unwrap_or_default();
            let context_pct = extract_context_pct(&pane);
            let frontier_summary = extract_frontier_summary(&pane);
            rows.push(ActivityRow {
                record,
                context_pct,
                frontier_summary,
            });
        }

        let markdown = render_markdown(&rows);
        if let Some(parent) = std::path::Path::new(&output_path).parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::write(&output_path, markdown).await {
            tracing::warn!(error = %e, "failed to write activity summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::types::{AgentKind, ResourceLimits};

    #[test]
    fn extract_context_pct_finds_percentage() {
        let pane = "some output\nmore output\ncontext: 67% used\nprompt>";
        assert_eq!(extract_context_pct(pane), Some(67));
    }

    #[test]
    fn extract_context_pct_none_when_missing() {
        assert_eq!(extract_context_pct("hello world\nno percentage here"), None);
    }

    #[test]
    fn extract_frontier_summary_truncates_long_tail() {
        let long = "word ".repeat(200);
        let result = extract_frontier_summary(&long).unwrap();
        assert!(result.len() <= 254);
    }

    #[test]
    fn render_markdown_includes_instance_row() {
        let record = InstanceRecord::new(
            "brave-otter".into(),
            "backend".into(),
            AgentKind::Claude,
            None,
            "/tmp/brave-otter".into(),
            None,
            ResourceLimits::default(),
        );
        let rows = vec![ActivityRow {
            record,
            context_pct: Some(42),
            frontier_summary: Some("writing migration".to_string()),
        }];
        let md = render_markdown(&rows);
        assert!(md.contains("brave-otter"));
        assert!(md.contains("42%"));
        assert!(md.contains("writing migration"));
    }
}
