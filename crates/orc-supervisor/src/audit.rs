//! Audit log query surface (SPEC_FULL.md §1B, §4.14): a bounded in-memory
//! ring buffer of recent audit events, queryable by instance id / event type /
//! a `since` timestamp. Every push also emits a `tracing` event so the
//! information is never solely in memory.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub instance_id: Option<String>,
    pub payload: Value,
}

pub struct AuditLog {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        AuditLog {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, event_type: &str, instance_id: Option<&str>, payload: Value) {
        let event = AuditEvent {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            instance_id: instance_id.map(|s| s.to_string()),
            payload: payload.clone(),
        };
        tracing::info!(event_type, instance_id = instance_id.unwrap_or("-"), %payload, "audit event");

        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    pub fn query(
        &self,
        instance_id: Option<&str>,
        event_type: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap();
        events
            .iter()
            .filter(|e| instance_id.map(|id| e.instance_id.as_deref() == Some(id)).unwrap_or(true))
            .filter(|e| event_type.map(|t| e.event_type == t).unwrap_or(true))
            .filter(|e| since.map(|s| e.timestamp >= s).unwrap_or(true))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_beyond_capacity() {
        let log = AuditLog::new(2);
        log.record("a", None, Value::Null);
        log.record("b", None, Value::Null);
        log.record("c", None, Value::Null);
        let all = log.query(None, None, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, "b");
        assert_eq!(all[1].event_type, "c");
    }

    #[test]
    fn query_filters_by_instance_and_type() {
        let log = AuditLog::new(10);
        log.record("spawn", Some("inst-1"), Value::Null);
        log.record("spawn", Some("inst-2"), Value::Null);
        log.record("terminate", Some("inst-1"), Value::Null);

        let filtered = log.query(Some("inst-1"), Some("spawn"), None);
        assert_eq!(filtered.len(), 1);
    }
}
