//! Startup hooks and the pending-start flag used to replay startup for
//! late joiners

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{Priority, StartupHook, SubscriberId};

/// Registered startup hook
#[derive(Clone)]
pub struct StartupEntry {
    pub id: SubscriberId,
    pub priority: Priority,
    pub hook: Arc<dyn StartupHook>,
}

/// Startup work owed to a hook at registration time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Ports are not ready yet
    Nothing,
    /// A start was requested before any hook existed; run every hook
    All,
    /// Startup already ran; run only the new hook
    Single,
}

#[derive(Default)]
struct Inner {
    hooks: Vec<StartupEntry>,
    pending: bool,
    started: bool,
}

#[derive(Default)]
pub struct StartupRegistry {
    inner: Mutex<Inner>,
}

impl StartupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook and say what startup work the caller must queue for it.
    /// A pending start is consumed here.
    pub fn add(&self, id: SubscriberId, priority: Priority, hook: Arc<dyn StartupHook>) -> Replay {
        debug!(subscriber = %id, %priority, "StartupRegistry::add: called");
        let mut inner = self.inner.lock();
        inner.hooks.push(StartupEntry { id, priority, hook });
        if std::mem::take(&mut inner.pending) {
            inner.started = true;
            Replay::All
        } else if inner.started {
            Replay::Single
        } else {
            Replay::Nothing
        }
    }

    pub fn get(&self, id: &SubscriberId) -> Option<StartupEntry> {
        self.inner.lock().hooks.iter().find(|e| &e.id == id).cloned()
    }

    /// Record that ports are ready. Returns true if hooks exist and startup
    /// should run now; otherwise the request stays pending.
    pub fn request_start(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.hooks.is_empty() {
            debug!("StartupRegistry::request_start: no hooks yet, pending");
            inner.pending = true;
            false
        } else {
            inner.started = true;
            true
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending
    }

    /// Hooks ordered highest priority first, ties by subscriber id
    pub fn ordered(&self) -> Vec<StartupEntry> {
        let mut hooks = self.inner.lock().hooks.clone();
        hooks.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        hooks
    }

    pub fn len(&self) -> usize {
        self.inner.lock().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StartupDone, StartupPhase};

    fn noop() -> Arc<dyn StartupHook> {
        Arc::new(|_: StartupPhase, done: StartupDone| done.complete())
    }

    #[test]
    fn test_pending_start_replayed_for_late_joiner() {
        let registry = StartupRegistry::new();
        assert!(!registry.request_start());
        assert!(registry.is_pending());

        assert_eq!(registry.add("dot1x".into(), Priority::Normal, noop()), Replay::All);
        assert!(!registry.is_pending());
        assert_eq!(registry.add("mab".into(), Priority::Normal, noop()), Replay::Single);
        assert!(registry.request_start());
    }

    #[test]
    fn test_hook_before_start_needs_nothing() {
        let registry = StartupRegistry::new();
        assert_eq!(registry.add("fdb".into(), Priority::Low, noop()), Replay::Nothing);
        assert!(registry.request_start());
        assert!(registry.get(&"fdb".into()).is_some());
    }

    #[test]
    fn test_ordered_by_priority_then_id() {
        let registry = StartupRegistry::new();
        registry.add("mab".into(), Priority::Normal, noop());
        registry.add("fdb".into(), Priority::Low, noop());
        registry.add("authmgr".into(), Priority::High, noop());
        registry.add("acl".into(), Priority::Normal, noop());

        let ids: Vec<String> = registry.ordered().into_iter().map(|e| e.id.to_string()).collect();
        assert_eq!(ids, vec!["authmgr", "acl", "mab", "fdb"]);
    }
}
