//! Daemon liveness loop (SPEC_FULL.md §4.7.1): pings the shared-state daemon
//! on an interval, escalates severity with consecutive failures, and on
//! reaching the failure threshold degrades the system to the in-process
//! fallback and marks every live instance as running with reduced
//! functionality.

use std::sync::Arc;
use std::time::Duration;

use orc_broker::daemon_client::{InProcessDaemon, SharedStateDaemon};
use orc_registry::registry::InstanceRegistry;
use tokio::sync::RwLock;

use crate::audit::AuditLog;

const FAILURE_THRESHOLD: u32 = 3;

pub struct DaemonHealthSupervisor {
    daemon: Arc<RwLock<Arc<dyn SharedStateDaemon>>>,
    registry: Arc<InstanceRegistry>,
    audit: Arc<AuditLog>,
}

impl DaemonHealthSupervisor {
    pub fn new(
        daemon: Arc<RwLock<Arc<dyn SharedStateDaemon>>>,
        registry: Arc<InstanceRegistry>,
        audit: Arc<AuditLog>,
    ) -> Self {
        DaemonHealthSupervisor { daemon, registry, audit }
    }

    /// Runs until the daemon is declared down, or `cancel` is ready.
    pub async fn run(
        &self,
        check_interval: Duration,
        check_timeout: Duration,
        cancel: tokio_util::sync::CancellationToken,
    ) {
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(check_interval) => {}
            }

            let report = {
                let guard = self.daemon.read().await;
                guard.health_check(check_timeout).await
            };

            if report.healthy {
                if consecutive_failures > 0 {
                    tracing::info!("daemon recovered after {consecutive_failures} failed checks");
                }
                consecutive_failures = 0;
                continue;
            }

            consecutive_failures += 1;
            let error = report.error.unwrap_or_default();
            if consecutive_failures >= FAILURE_THRESHOLD {
                tracing::error!(consecutive_failures, error, "daemon health check failed repeatedly, degrading");
            } else {
                tracing::warn!(consecutive_failures, error, "daemon health check failed");
            }

            if consecutive_failures >= FAILURE_THRESHOLD {
                self.degrade(consecutive_failures).await;
                return;
            }
        }
    }

    async fn degrade(&self, consecutive_failures: u32) {
        {
            let mut guard = self.daemon.write().await;
            *guard = Arc::new(InProcessDaemon::new());
        }

        for record in self.registry.list_all() {
            if record.state.is_terminal() {
                continue;
            }
            let _ = self.registry.with_mut(&record.id, |r| {
                r.error_message = Some(
                    "shared-state daemon is unreachable; running with reduced functionality"
                        .to_string(),
                );
            });
        }

        self.audit.record(
            "manager_daemon_failure",
            None,
            serde_json::json!({ "consecutive_failures": consecutive_failures }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orc_core::types::ReplyPayload;
    use orc_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyDaemon {
        healthy: AtomicU32,
    }

    #[async_trait]
    impl SharedStateDaemon for FlakyDaemon {
        async fn create_response_queue(&self, _recipient_id: &str) {}
        async fn enqueue_reply(&self, _recipient_id: &str, _payload: ReplyPayload) -> Result<(), Error> {
            Ok(())
        }
        async fn try_recv_reply(
            &self,
            _recipient_id: &str,
            _timeout: Duration,
        ) -> Result<Option<ReplyPayload>, Error> {
            Ok(None)
        }
        async fn register_envelope(&self, _correlation_id: &str, _recipient_id: &str) {}
        async fn mark_envelope_replied(&self, _correlation_id: &str, _reply_content: &str) {}
        async fn mark_envelope_status(&self, _correlation_id: &str, _status: orc_core::types::EnvelopeStatus) {}
        async fn cleanup_instance(&self, _id: &str) {}
        async fn health_check(&self, _timeout: Duration) -> orc_broker::daemon_client::HealthReport {
            self.healthy.fetch_add(1, Ordering::SeqCst);
            orc_broker::daemon_client::HealthReport {
                healthy: false,
                response_time_ms: 1,
                error: Some("connection refused".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn degrades_after_threshold_failures() {
        let daemon: Arc<RwLock<Arc<dyn SharedStateDaemon>>> =
            Arc::new(RwLock::new(Arc::new(FlakyDaemon { healthy: AtomicU32::new(0) })));
        let registry = Arc::new(InstanceRegistry::new());
        let audit = Arc::new(AuditLog::new(10));

        let supervisor = DaemonHealthSupervisor::new(daemon.clone(), registry, audit.clone());
        supervisor
            .run(Duration::from_millis(1), Duration::from_millis(50), tokio_util::sync::CancellationToken::new())
            .await;

        let events = audit.query(None, Some("manager_daemon_failure"), None);
        assert_eq!(events.len(), 1);
    }
}
