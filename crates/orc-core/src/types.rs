use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique identifier for a spawned instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new() -> Self {
        InstanceId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        InstanceId(s)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        InstanceId(s.to_string())
    }
}

/// Which CLI the instance wraps; the two differ in how tool-server wiring and
/// readiness detection work (see orc-wiring and orc-mux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Codex,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Claude => write!(f, "claude"),
            AgentKind::Codex => write!(f, "codex"),
        }
    }
}

/// Instance lifecycle state machine (SPEC_FULL.md §4.4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Initializing,
    Running,
    Idle,
    Busy,
    Error,
    Terminated,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceState::Initializing => "initializing",
            InstanceState::Running => "running",
            InstanceState::Idle => "idle",
            InstanceState::Busy => "busy",
            InstanceState::Error => "error",
            InstanceState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

impl InstanceState {
    /// Whether a new inbound request (send_to_instance) may be accepted in this state.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, InstanceState::Running | InstanceState::Idle)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Terminated)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_tokens: Option<u64>,
    pub max_cost: Option<f64>,
    pub timeout_minutes: Option<u64>,
}

/// One spawned agent. Owned exclusively by the Instance Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub display_name: String,
    pub role: String,
    pub kind: AgentKind,
    pub model: Option<String>,
    pub state: InstanceState,
    pub workspace_path: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub parent_id: Option<InstanceId>,
    pub children: Vec<InstanceId>,
    pub cumulative_tokens: u64,
    pub cumulative_cost: f64,
    pub request_count: u64,
    pub resource_limits: ResourceLimits,
    pub pending_system_prompt: Option<String>,
    pub initial_prompt: Option<String>,
    pub error_message: Option<String>,
}

impl InstanceRecord {
    pub fn new(
        display_name: String,
        role: String,
        kind: AgentKind,
        model: Option<String>,
        workspace_path: String,
        parent_id: Option<InstanceId>,
        resource_limits: ResourceLimits,
    ) -> Self {
        let now = Utc::now();
        InstanceRecord {
            id: InstanceId::new(),
            display_name,
            role,
            kind,
            model,
            state: InstanceState::Initializing,
            workspace_path,
            created_at: now,
            last_activity_at: now,
            parent_id,
            children: Vec::new(),
            cumulative_tokens: 0,
            cumulative_cost: 0.0,
            request_count: 0,
            resource_limits,
            pending_system_prompt: None,
            initial_prompt: None,
            error_message: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

/// Tracks one outbound request/reply round-trip (SPEC_FULL.md §3 Message Envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Sent,
    Delivered,
    Replied,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub correlation_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub status: EnvelopeStatus,
    pub replied_at: Option<DateTime<Utc>>,
    pub reply_content: Option<String>,
}

impl MessageEnvelope {
    pub fn new(sender_id: String, recipient_id: String, content: String) -> Self {
        MessageEnvelope {
            correlation_id: Uuid::new_v4().to_string(),
            sender_id,
            recipient_id,
            content,
            sent_at: Utc::now(),
            status: EnvelopeStatus::Sent,
            replied_at: None,
            reply_content: None,
        }
    }
}

/// One payload pushed into a recipient's reply queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub sender_id: String,
    pub reply_message: String,
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationKind {
    Sequential,
    Parallel,
    Consensus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationTask {
    pub task_id: String,
    pub coordinator_id: String,
    pub participant_ids: Vec<String>,
    pub kind: CoordinationKind,
    pub status: CoordinationStatus,
    pub results: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_roundtrips_through_string() {
        let id = InstanceId::new();
        let s = id.to_string();
        let back = InstanceId::from(s.clone());
        assert_eq!(back.as_str(), s);
    }

    #[test]
    fn instance_state_accepts_requests_only_when_running_or_idle() {
        assert!(InstanceState::Running.accepts_requests());
        assert!(InstanceState::Idle.accepts_requests());
        assert!(!InstanceState::Busy.accepts_requests());
        assert!(!InstanceState::Terminated.accepts_requests());
    }

    #[test]
    fn role_serde_roundtrip() {
        let kind = AgentKind::Codex;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"codex\"");
        let back: AgentKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AgentKind::Codex);
    }
}
