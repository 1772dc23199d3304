//! Shared-State Daemon contract (SPEC_FULL.md §4.6): the trait the Broker and
//! Lifecycle Manager use for cross-process reply queues, envelope bookkeeping,
//! and liveness, kept here (rather than in `orc-broker`, which implements it)
//! so `orc-registry`'s lifecycle manager can depend on the contract without
//! depending on the broker crate.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{EnvelopeStatus, ReplyPayload};

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

#[async_trait]
pub trait SharedStateDaemon: Send + Sync {
    async fn create_response_queue(&self, recipient_id: &str);
    async fn enqueue_reply(&self, recipient_id: &str, payload: ReplyPayload) -> Result<(), crate::Error>;
    async fn try_recv_reply(
        &self,
        recipient_id: &str,
        timeout: Duration,
    ) -> Result<Option<ReplyPayload>, crate::Error>;
    async fn register_envelope(&self, correlation_id: &str, recipient_id: &str);
    async fn mark_envelope_replied(&self, correlation_id: &str, reply_content: &str);
    async fn mark_envelope_status(&self, correlation_id: &str, status: EnvelopeStatus);
    async fn cleanup_instance(&self, id: &str);
    async fn health_check(&self, timeout: Duration) -> HealthReport;
}
