//! Usage enrichment (SPEC_FULL.md §4.11): best-effort folding of a recognized
//! per-instance usage log into an instance's cumulative counters. Purely
//! additive — never the source of truth, which remains the word-count
//! estimate in `broker::estimate_tokens`.

use orc_core::types::InstanceId;
use orc_core::Error;
use orc_registry::registry::InstanceRegistry;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UsageLogLine {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cost: f64,
}

/// Parses newly-read bytes as newline-delimited JSON usage records and folds
/// their totals into the instance's counters. Malformed lines are skipped
/// rather than aborting the whole enrichment pass.
pub fn apply_usage_log_bytes(
    registry: &InstanceRegistry,
    id: &InstanceId,
    new_bytes: &[u8],
) -> Result<(), Error> {
    let text = String::from_utf8_lossy(new_bytes);
    let mut extra_tokens = 0u64;
    let mut extra_cost = 0f64;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<UsageLogLine>(trimmed) {
            extra_tokens += entry.input_tokens + entry.output_tokens;
            extra_cost += entry.cost;
        }
    }

    if extra_tokens > 0 || extra_cost > 0.0 {
        registry.with_mut(id, |rec| {
            rec.cumulative_tokens += extra_tokens;
            rec.cumulative_cost += extra_cost;
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::types::{AgentKind, InstanceRecord, ResourceLimits};

    #[test]
    fn enrichment_adds_to_existing_counters_without_replacing() {
        let registry = InstanceRegistry::new();
        let record = InstanceRecord::new(
            "x".into(),
            "general".into(),
            AgentKind::Claude,
            None,
            "/tmp/x".into(),
            None,
            ResourceLimits::default(),
        );
        let id = record.id.clone();
        registry.insert(record).unwrap();
        registry.with_mut(&id, |r| r.cumulative_tokens = 10).unwrap();

        let log = b"{\"input_tokens\":5,\"output_tokens\":7,\"cost\":0.02}\nnot json\n";
        apply_usage_log_bytes(&registry, &id, log).unwrap();

        let after = registry.get(&id).unwrap();
        assert_eq!(after.cumulative_tokens, 10 + 12);
        assert!((after.cumulative_cost - 0.02).abs() < 1e-9);
    }

    #[test]
    fn malformed_lines_are_skipped_silently() {
        let registry = InstanceRegistry::new();
        let record = InstanceRecord::new(
            "x".into(),
            "general".into(),
            AgentKind::Claude,
            None,
            "/tmp/x".into(),
            None,
            ResourceLimits::default(),
        );
        let id = record.id.clone();
        registry.insert(record).unwrap();

        apply_usage_log_bytes(&registry, &id, b"garbage\nmore garbage\n").unwrap();
        assert_eq!(registry.get(&id).unwrap().cumulative_tokens, 0);
    }
}
