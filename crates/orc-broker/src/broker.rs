//! Messaging Broker (SPEC_FULL.md §4.5): composes sends, races the reply-tool
//! path against a pane-scrape fallback, and implements broadcast/coordinate
//! fan-outs.

use std::collections::HashMap;
use std::time::Duration;

use orc_core::types::{
    CoordinationKind, CoordinationStatus, CoordinationTask, EnvelopeStatus, InstanceId,
    InstanceState, MessageEnvelope, ReplyPayload,
};
use orc_core::Error;
use orc_mux::extract::extract_response;
use orc_mux::tmux::{CaptureMode, Tmux};
use orc_registry::registry::InstanceRegistry;
use uuid::Uuid;

use crate::daemon_client::SharedStateDaemon;

/// Canonical usage estimator: word count of the combined outbound + inbound
/// text. Never overridden by usage-log enrichment (see `usage.rs`), only
/// added to (SPEC_FULL.md Open Question 1).
pub fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub protocol: &'static str,
    pub status: &'static str,
    pub correlation_id: String,
    pub response: Option<String>,
}

const STABLE_POLLS_REQUIRED: u32 = 3;
const SCRAPE_POLL_INTERVAL: Duration = Duration::from_millis(300);

#[allow(clippy::too_many_arguments)]
pub async fn send(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    daemon: &dyn SharedStateDaemon,
    sender_id: &str,
    recipient_id: &InstanceId,
    message: &str,
    wait_for_response: bool,
    timeout: Duration,
) -> Result<SendOutcome, Error> {
    let record = registry
        .get(recipient_id)
        .ok_or_else(|| Error::instance_not_found(recipient_id.as_str()))?;
    if !record.state.accepts_requests() {
        return Err(Error::wrong_state(recipient_id.as_str(), record.state.to_string()));
    }

    registry.set_state(recipient_id, InstanceState::Busy)?;
    registry.with_mut(recipient_id, |r| {
        r.touch();
        r.request_count += 1;
    })?;

    let envelope = MessageEnvelope::new(sender_id.to_string(), recipient_id.as_str().to_string(), message.to_string());
    daemon
        .register_envelope(&envelope.correlation_id, recipient_id.as_str())
        .await;
    daemon.create_response_queue(recipient_id.as_str()).await;

    let pending_prompt = record.pending_system_prompt.clone();
    if pending_prompt.is_some() {
        registry.with_mut(recipient_id, |r| r.pending_system_prompt = None)?;
    }
    let composed = match &pending_prompt {
        Some(sys) => format!("{sys}\n\n[MSG:{}] {message}", envelope.correlation_id),
        None => format!("[MSG:{}] {message}", envelope.correlation_id),
    };

    let pane = record.display_name.clone();
    let deliver_result = orc_mux::pacer::send_paced(tmux, &pane, &composed, true).await;
    if deliver_result.is_ok() {
        daemon
            .mark_envelope_status(&envelope.correlation_id, EnvelopeStatus::Delivered)
            .await;
    }

    let result = match deliver_result {
        Ok(()) => run_send_body(
            registry,
            tmux,
            daemon,
            recipient_id,
            &pane,
            message,
            &envelope,
            wait_for_response,
            timeout,
        )
        .await
        .map_err(Some),
        Err(e) => Err(Some(e)),
    };

    let _ = registry.set_state(recipient_id, InstanceState::Idle);

    match result {
        Ok(outcome) => Ok(outcome),
        Err(Some(e)) => Err(e),
        Err(None) => unreachable!(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_send_body(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    daemon: &dyn SharedStateDaemon,
    recipient_id: &InstanceId,
    pane: &str,
    outbound_message: &str,
    envelope: &MessageEnvelope,
    wait_for_response: bool,
    timeout: Duration,
) -> Result<SendOutcome, Error> {
    if !wait_for_response {
        let estimate = estimate_tokens(outbound_message);
        registry.with_mut(recipient_id, |r| r.cumulative_tokens += estimate)?;
        return Ok(SendOutcome {
            protocol: "fire_and_forget",
            status: "sent",
            correlation_id: envelope.correlation_id.clone(),
            response: None,
        });
    }

    match daemon
        .try_recv_reply(recipient_id.as_str(), timeout)
        .await?
    {
        Some(reply) => {
            daemon
                .mark_envelope_replied(&envelope.correlation_id, &reply.reply_message)
                .await;
            let estimate = estimate_tokens(outbound_message) + estimate_tokens(&reply.reply_message);
            registry.with_mut(recipient_id, |r| r.cumulative_tokens += estimate)?;
            Ok(SendOutcome {
                protocol: "bidirectional",
                status: "replied",
                correlation_id: envelope.correlation_id.clone(),
                response: Some(reply.reply_message),
            })
        }
        None => {
            // Reply-tool path timed out; fall back to activity-based scraping.
            let baseline = tmux.capture_pane(pane, CaptureMode::Visible).await.unwrap_or_default();
            match poll_for_completion(tmux, pane, &baseline, timeout).await {
                Some(raw) => {
                    let extracted = extract_response(&raw, Some(outbound_message));
                    daemon
                        .mark_envelope_replied(&envelope.correlation_id, &extracted)
                        .await;
                    let estimate = estimate_tokens(outbound_message) + estimate_tokens(&extracted);
                    registry.with_mut(recipient_id, |r| r.cumulative_tokens += estimate)?;
                    Ok(SendOutcome {
                        protocol: "polling_fallback",
                        status: "replied",
                        correlation_id: envelope.correlation_id.clone(),
                        response: Some(extracted),
                    })
                }
                None => {
                    daemon
                        .mark_envelope_status(&envelope.correlation_id, EnvelopeStatus::Timeout)
                        .await;
                    let raw = tmux.capture_pane(pane, CaptureMode::Visible).await.unwrap_or_default();
                    Ok(SendOutcome {
                        protocol: "polling_fallback",
                        status: "timeout",
                        correlation_id: envelope.correlation_id.clone(),
                        response: Some(extract_response(&raw, Some(outbound_message))),
                    })
                }
            }
        }
    }
}

/// Activity-based completion detection (SPEC_FULL.md §4.5.2): wait for the
/// pane to change from `baseline`, then for it to go quiet for
/// `STABLE_POLLS_REQUIRED` consecutive polls.
async fn poll_for_completion(tmux: &Tmux, pane: &str, baseline: &str, timeout: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut response_started = false;
    let mut stable_count = 0u32;
    let mut last_capture = baseline.to_string();

    loop {
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(SCRAPE_POLL_INTERVAL).await;
        let capture = match tmux.capture_pane(pane, CaptureMode::Visible).await {
            Ok(c) => c,
            Err(_) => continue,
        };

        if !response_started {
            if capture.len() > baseline.len() {
                response_started = true;
            }
            last_capture = capture;
            continue;
        }

        if capture == last_capture {
            stable_count += 1;
        } else {
            stable_count = 0;
        }
        last_capture = capture;

        if stable_count >= STABLE_POLLS_REQUIRED {
            return Some(last_capture);
        }
    }
}

/// Reply-tool entry point (SPEC_FULL.md §4.5.3): called when an agent invokes
/// its reply tool.
pub async fn reply_to_caller(
    registry: &InstanceRegistry,
    daemon: &dyn SharedStateDaemon,
    instance_id: &InstanceId,
    reply_message: &str,
    correlation_id: Option<&str>,
) -> Result<(String, String), Error> {
    let record = registry
        .get(instance_id)
        .ok_or_else(|| Error::instance_not_found(instance_id.as_str()))?;
    let destination = record
        .parent_id
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "coordinator".to_string());

    if let Some(cid) = correlation_id {
        daemon.mark_envelope_replied(cid, reply_message).await;
    }

    let payload = ReplyPayload {
        sender_id: instance_id.as_str().to_string(),
        reply_message: reply_message.to_string(),
        correlation_id: correlation_id.map(|s| s.to_string()),
        timestamp: chrono::Utc::now(),
    };
    daemon.enqueue_reply(&destination, payload).await?;

    Ok((
        destination,
        correlation_id.unwrap_or_default().to_string(),
    ))
}

/// Broadcast the same message to every non-terminated child of `parent_id`.
pub async fn broadcast_to_children(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    daemon: &dyn SharedStateDaemon,
    parent_id: &InstanceId,
    message: &str,
    wait_for_response: bool,
    timeout: Duration,
) -> HashMap<String, Result<SendOutcome, String>> {
    let mut results = HashMap::new();
    for child in registry.children_of(parent_id) {
        if let Some(rec) = registry.get(&child) {
            if rec.state.is_terminal() {
                continue;
            }
        }
        let outcome = send(
            registry,
            tmux,
            daemon,
            parent_id.as_str(),
            &child,
            message,
            wait_for_response,
            timeout,
        )
        .await
        .map_err(|e| e.to_string());
        results.insert(child.as_str().to_string(), outcome);
    }
    results
}

/// Coordinate a task across participants: `sequential` sends in order,
/// `parallel`/`consensus` fan out concurrently (consensus leaves resolution
/// policy to the caller, per SPEC_FULL.md §4.5.4).
#[allow(clippy::too_many_arguments)]
pub async fn coordinate(
    registry: &InstanceRegistry,
    tmux: &Tmux,
    daemon: &dyn SharedStateDaemon,
    coordinator_id: &str,
    participant_ids: Vec<InstanceId>,
    kind: CoordinationKind,
    task_description: &str,
    timeout: Duration,
) -> CoordinationTask {
    let mut task = CoordinationTask {
        task_id: Uuid::new_v4().to_string(),
        coordinator_id: coordinator_id.to_string(),
        participant_ids: participant_ids.iter().map(|p| p.as_str().to_string()).collect(),
        kind,
        status: CoordinationStatus::Running,
        results: HashMap::new(),
    };

    match kind {
        CoordinationKind::Sequential => {
            for pid in &participant_ids {
                match send(registry, tmux, daemon, coordinator_id, pid, task_description, true, timeout).await {
                    Ok(outcome) => {
                        task.results.insert(
                            pid.as_str().to_string(),
                            outcome.response.unwrap_or_default(),
                        );
                    }
                    Err(e) => {
                        task.results.insert(pid.as_str().to_string(), format!("error: {e}"));
                    }
                }
            }
        }
        CoordinationKind::Parallel | CoordinationKind::Consensus => {
            let mut futures = Vec::new();
            for pid in &participant_ids {
                futures.push(send(registry, tmux, daemon, coordinator_id, pid, task_description, true, timeout));
            }
            let outcomes = futures::future::join_all(futures).await;
            for (pid, outcome) in participant_ids.iter().zip(outcomes) {
                match outcome {
                    Ok(o) => {
                        task.results
                            .insert(pid.as_str().to_string(), o.response.unwrap_or_default());
                    }
                    Err(e) => {
                        task.results.insert(pid.as_str().to_string(), format!("error: {e}"));
                    }
                }
            }
        }
    }

    task.status = CoordinationStatus::Completed;
    task
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_counts_words() {
        assert_eq!(estimate_tokens("hello there friend"), 3);
        assert_eq!(estimate_tokens(""), 0);
    }
}
