//! In-memory Instance Registry: the single owner of Instance Records
//! (SPEC_FULL.md §3 Ownership). Backed by `DashMap` for per-key locking
//! rather than one global mutex, following the teacher's `SubagentRegistry`.

use dashmap::DashMap;
use orc_core::types::{InstanceId, InstanceRecord, InstanceState};
use orc_core::Error;

#[derive(Default)]
pub struct InstanceRegistry {
    instances: DashMap<String, InstanceRecord>,
    root_id: std::sync::RwLock<Option<String>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.instances
            .iter()
            .filter(|e| !e.value().state.is_terminal())
            .count()
    }

    pub fn has_root(&self) -> bool {
        self.root_id.read().unwrap().is_some()
    }

    /// Inserts a new record. If it has no parent, it becomes the registry's
    /// root — enforcing the single-root forest invariant (SPEC_FULL.md §3).
    pub fn insert(&self, record: InstanceRecord) -> Result<(), Error> {
        if record.parent_id.is_none() {
            let mut root = self.root_id.write().unwrap();
            if root.is_some() {
                return Err(Error::ParentUnresolvable {
                    reason: "a root instance already exists; only one rootless instance is permitted".into(),
                });
            }
            *root = Some(record.id.as_str().to_string());
        } else {
            let parent_key = record.parent_id.as_ref().unwrap().as_str().to_string();
            if !self.instances.contains_key(&parent_key) {
                return Err(Error::ParentUnresolvable {
                    reason: format!("parent instance {parent_key} does not exist"),
                });
            }
            if let Some(mut parent) = self.instances.get_mut(&parent_key) {
                parent.children.push(record.id.clone());
            }
        }
        self.instances.insert(record.id.as_str().to_string(), record);
        Ok(())
    }

    pub fn get(&self, id: &InstanceId) -> Option<InstanceRecord> {
        self.instances.get(id.as_str()).map(|e| e.value().clone())
    }

    pub fn exists(&self, id: &InstanceId) -> bool {
        self.instances.contains_key(id.as_str())
    }

    pub fn list_all(&self) -> Vec<InstanceRecord> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }

    pub fn children_of(&self, id: &InstanceId) -> Vec<InstanceId> {
        self.instances
            .get(id.as_str())
            .map(|e| e.value().children.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.instances
            .iter()
            .map(|e| e.value().display_name.clone())
            .collect()
    }

    /// Applies `f` to the record under a short critical section and returns
    /// its result, or `InstanceNotFound`.
    pub fn with_mut<F, R>(&self, id: &InstanceId, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut InstanceRecord) -> R,
    {
        self.instances
            .get_mut(id.as_str())
            .map(|mut e| f(e.value_mut()))
            .ok_or_else(|| Error::instance_not_found(id.as_str()))
    }

    pub fn set_state(&self, id: &InstanceId, state: InstanceState) -> Result<(), Error> {
        self.with_mut(id, |rec| rec.state = state)
    }

    pub fn mark_error(&self, id: &InstanceId, message: impl Into<String>) -> Result<(), Error> {
        self.with_mut(id, |rec| {
            rec.state = InstanceState::Error;
            rec.error_message = Some(message.into());
        })
    }

    pub fn remove(&self, id: &InstanceId) -> Option<InstanceRecord> {
        self.instances.remove(id.as_str()).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_core::types::{AgentKind, ResourceLimits};

    fn make_record(parent: Option<InstanceId>) -> InstanceRecord {
        InstanceRecord::new(
            "test-instance".into(),
            "general".into(),
            AgentKind::Claude,
            None,
            "/tmp/ws".into(),
            parent,
            ResourceLimits::default(),
        )
    }

    #[test]
    fn first_rootless_insert_becomes_root() {
        let reg = InstanceRegistry::new();
        reg.insert(make_record(None)).unwrap();
        assert!(reg.has_root());
    }

    #[test]
    fn second_rootless_insert_is_rejected() {
        let reg = InstanceRegistry::new();
        reg.insert(make_record(None)).unwrap();
        let err = reg.insert(make_record(None)).unwrap_err();
        assert_eq!(err.kind(), "ParentUnresolvable");
    }

    #[test]
    fn child_insert_requires_existing_parent() {
        let reg = InstanceRegistry::new();
        let bogus_parent = InstanceId::new();
        let err = reg.insert(make_record(Some(bogus_parent))).unwrap_err();
        assert_eq!(err.kind(), "ParentUnresolvable");
    }

    #[test]
    fn child_insert_registers_under_parent() {
        let reg = InstanceRegistry::new();
        let root = make_record(None);
        let root_id = root.id.clone();
        reg.insert(root).unwrap();

        let child = make_record(Some(root_id.clone()));
        let child_id = child.id.clone();
        reg.insert(child).unwrap();

        assert_eq!(reg.children_of(&root_id), vec![child_id]);
    }

    #[test]
    fn active_count_excludes_terminated() {
        let reg = InstanceRegistry::new();
        let rec = make_record(None);
        let id = rec.id.clone();
        reg.insert(rec).unwrap();
        assert_eq!(reg.active_count(), 1);
        reg.set_state(&id, InstanceState::Terminated).unwrap();
        assert_eq!(reg.active_count(), 0);
    }
}
