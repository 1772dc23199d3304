//! Shared-State Daemon Client (SPEC_FULL.md §4.6): the contract the Broker
//! uses for cross-process reply queues, envelope bookkeeping, and liveness.
//! Two implementations: an in-process fallback (used when no daemon is
//! configured, or after the Health Supervisor degrades the system), and a
//! TCP-backed client that speaks the same JSON-RPC framing as the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use orc_core::types::{EnvelopeStatus, MessageEnvelope, ReplyPayload};
use orc_core::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

pub use orc_core::daemon::{HealthReport, SharedStateDaemon};

const QUEUE_CAPACITY: usize = 256;

/// Default implementation: process-local, asynchronous queues. Used whenever
/// no external daemon is configured, and as the landing spot the Broker falls
/// back to once the Health Supervisor declares the remote daemon down.
///
/// Tracks full `MessageEnvelope`s (not just recipient ids) so a caller can
/// later ask what became of a given correlation id — sent, delivered,
/// replied, timed out, or errored (SPEC_FULL.md §3).
#[derive(Default)]
pub struct InProcessDaemon {
    queues: DashMap<String, (mpsc::Sender<ReplyPayload>, Arc<Mutex<mpsc::Receiver<ReplyPayload>>>)>,
    envelopes: DashMap<String, MessageEnvelope>,
}

impl InProcessDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a tracked envelope's current status/reply content, if any.
    pub fn envelope(&self, correlation_id: &str) -> Option<MessageEnvelope> {
        self.envelopes.get(correlation_id).map(|e| e.value().clone())
    }
}

#[async_trait]
impl SharedStateDaemon for InProcessDaemon {
    async fn create_response_queue(&self, recipient_id: &str) {
        self.queues.entry(recipient_id.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            (tx, Arc::new(Mutex::new(rx)))
        });
    }

    async fn enqueue_reply(&self, recipient_id: &str, payload: ReplyPayload) -> Result<(), Error> {
        self.create_response_queue(recipient_id).await;
        let entry = self.queues.get(recipient_id).unwrap();
        entry
            .0
            .send(payload)
            .await
            .map_err(|_| Error::internal(format!("reply queue closed for {recipient_id}")))
    }

    async fn try_recv_reply(
        &self,
        recipient_id: &str,
        timeout: Duration,
    ) -> Result<Option<ReplyPayload>, Error> {
        self.create_response_queue(recipient_id).await;
        let entry = self.queues.get(recipient_id).unwrap();
        let rx = entry.1.clone();
        drop(entry);
        let mut rx = rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }

    async fn register_envelope(&self, correlation_id: &str, recipient_id: &str) {
        let mut envelope = MessageEnvelope::new(String::new(), recipient_id.to_string(), String::new());
        envelope.correlation_id = correlation_id.to_string();
        self.envelopes.insert(correlation_id.to_string(), envelope);
    }

    async fn mark_envelope_replied(&self, correlation_id: &str, reply_content: &str) {
        // Tolerate unknown correlation ids: stdio subprocesses may reply
        // without ever registering through this path.
        if let Some(mut entry) = self.envelopes.get_mut(correlation_id) {
            entry.status = EnvelopeStatus::Replied;
            entry.reply_content = Some(reply_content.to_string());
            entry.replied_at = Some(chrono::Utc::now());
        }
    }

    async fn mark_envelope_status(&self, correlation_id: &str, status: EnvelopeStatus) {
        if let Some(mut entry) = self.envelopes.get_mut(correlation_id) {
            entry.status = status;
        }
    }

    async fn cleanup_instance(&self, id: &str) {
        self.queues.remove(id);
        self.envelopes.retain(|_, envelope| envelope.recipient_id != id);
    }

    async fn health_check(&self, _timeout: Duration) -> HealthReport {
        HealthReport {
            healthy: true,
            response_time_ms: 0,
            error: None,
        }
    }
}

/// TCP-backed client for an out-of-process daemon, speaking newline-delimited
/// JSON-RPC (see `orc_core::protocol`). Kept deliberately small: a `ping`
/// round-trip for health, and best-effort enqueue/dequeue calls; failures
/// bubble up as `Error::DaemonDown` so the Health Supervisor can degrade.
pub struct RemoteDaemon {
    addr: String,
}

impl RemoteDaemon {
    pub fn new(host: &str, port: u16) -> Self {
        RemoteDaemon {
            addr: format!("{host}:{port}"),
        }
    }

    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, Error> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| Error::DaemonDown(e.to_string()))?;
        let req = serde_json::json!({ "id": 1, "method": method, "params": params });
        let mut line = serde_json::to_string(&req).map_err(Error::from)?;
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::DaemonDown(e.to_string()))?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader
            .read_line(&mut response_line)
            .await
            .map_err(|e| Error::DaemonDown(e.to_string()))?;
        serde_json::from_str(&response_line).map_err(Error::from)
    }
}

#[async_trait]
impl SharedStateDaemon for RemoteDaemon {
    async fn create_response_queue(&self, recipient_id: &str) {
        let _ = self
            .request("create_response_queue", serde_json::json!({ "id": recipient_id }))
            .await;
    }

    async fn enqueue_reply(&self, recipient_id: &str, payload: ReplyPayload) -> Result<(), Error> {
        self.request(
            "enqueue_reply",
            serde_json::json!({ "recipient_id": recipient_id, "payload": payload }),
        )
        .await
        .map(|_| ())
    }

    async fn try_recv_reply(
        &self,
        recipient_id: &str,
        timeout: Duration,
    ) -> Result<Option<ReplyPayload>, Error> {
        let resp = tokio::time::timeout(
            timeout,
            self.request("recv_reply", serde_json::json!({ "recipient_id": recipient_id })),
        )
        .await
        .map_err(|_| Error::Timeout {
            id: recipient_id.to_string(),
            seconds: timeout.as_secs(),
        })??;
        if resp.is_null() {
            Ok(None)
        } else {
            serde_json::from_value(resp).map(Some).map_err(Error::from)
        }
    }

    async fn register_envelope(&self, correlation_id: &str, recipient_id: &str) {
        let _ = self
            .request(
                "register_envelope",
                serde_json::json!({ "correlation_id": correlation_id, "recipient_id": recipient_id }),
            )
            .await;
    }

    async fn mark_envelope_replied(&self, correlation_id: &str, reply_content: &str) {
        let _ = self
            .request(
                "mark_envelope_replied",
                serde_json::json!({ "correlation_id": correlation_id, "reply_content": reply_content }),
            )
            .await;
    }

    async fn mark_envelope_status(&self, correlation_id: &str, status: EnvelopeStatus) {
        let _ = self
            .request(
                "mark_envelope_status",
                serde_json::json!({ "correlation_id": correlation_id, "status": status }),
            )
            .await;
    }

    async fn cleanup_instance(&self, id: &str) {
        let _ = self.request("cleanup_instance", serde_json::json!({ "id": id })).await;
    }

    async fn health_check(&self, timeout: Duration) -> HealthReport {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.request("ping", serde_json::json!({}))).await {
            Ok(Ok(_)) => HealthReport {
                healthy: true,
                response_time_ms: start.elapsed().as_millis() as u64,
                error: None,
            },
            Ok(Err(e)) => HealthReport {
                healthy: false,
                response_time_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            },
            Err(_) => HealthReport {
                healthy: false,
                response_time_ms: timeout.as_millis() as u64,
                error: Some("timed out".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn payload(msg: &str) -> ReplyPayload {
        ReplyPayload {
            sender_id: "child-1".to_string(),
            reply_message: msg.to_string(),
            correlation_id: Some("cid-1".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_recv_round_trips() {
        let daemon = InProcessDaemon::new();
        daemon.enqueue_reply("coordinator", payload("hi")).await.unwrap();
        let got = daemon
            .try_recv_reply("coordinator", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(got.unwrap().reply_message, "hi");
    }

    #[tokio::test]
    async fn recv_times_out_when_empty() {
        let daemon = InProcessDaemon::new();
        let got = daemon
            .try_recv_reply("nobody", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_queue_and_envelopes() {
        let daemon = InProcessDaemon::new();
        daemon.register_envelope("cid-1", "child-1").await;
        daemon.enqueue_reply("child-1", payload("x")).await.unwrap();
        daemon.cleanup_instance("child-1").await;
        assert!(daemon.envelopes.is_empty());
    }

    #[tokio::test]
    async fn in_process_health_check_always_healthy() {
        let daemon = InProcessDaemon::new();
        let report = daemon.health_check(Duration::from_secs(1)).await;
        assert!(report.healthy);
    }

    #[tokio::test]
    async fn register_then_reply_tracks_status_and_content() {
        let daemon = InProcessDaemon::new();
        daemon.register_envelope("cid-1", "child-1").await;
        assert_eq!(daemon.envelope("cid-1").unwrap().status, EnvelopeStatus::Sent);

        daemon.mark_envelope_replied("cid-1", "done").await;
        let envelope = daemon.envelope("cid-1").unwrap();
        assert_eq!(envelope.status, EnvelopeStatus::Replied);
        assert_eq!(envelope.reply_content.as_deref(), Some("done"));
        assert!(envelope.replied_at.is_some());
    }

    #[tokio::test]
    async fn mark_envelope_status_transitions_to_timeout() {
        let daemon = InProcessDaemon::new();
        daemon.register_envelope("cid-2", "child-1").await;
        daemon.mark_envelope_status("cid-2", EnvelopeStatus::Timeout).await;
        assert_eq!(daemon.envelope("cid-2").unwrap().status, EnvelopeStatus::Timeout);
    }
}
