//! Subscriber registry
//!
//! Maps subscriber ids to a callback and an event-interest mask. Iteration
//! follows registration order, which is also the order subscribers are
//! invoked in.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{EventMask, PortEvent, Subscriber, SubscriberId};
use crate::error::{IntfError, IntfResult};

struct Entry {
    id: SubscriberId,
    callback: Arc<dyn Subscriber>,
    interest: EventMask,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    index: HashMap<SubscriberId, usize>,
}

/// One subscriber selected for a broadcast
#[derive(Clone)]
pub struct Interested {
    pub slot: usize,
    pub id: SubscriberId,
    pub callback: Arc<dyn Subscriber>,
}

impl std::fmt::Debug for Interested {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interested").field("slot", &self.slot).field("id", &self.id).finish()
    }
}

/// Registered subscribers in registration order
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: RwLock<Inner>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `id` to `callback`; returns the registration slot
    pub fn register(&self, id: SubscriberId, callback: Arc<dyn Subscriber>, interest: EventMask) -> IntfResult<usize> {
        debug!(subscriber = %id, %interest, "SubscriberRegistry::register: called");
        let mut inner = self.inner.write();
        if inner.index.contains_key(&id) {
            warn!(subscriber = %id, "SubscriberRegistry::register: duplicate registration");
            return Err(IntfError::DuplicateRegistration(id));
        }

        let slot = inner.entries.len();
        inner.index.insert(id.clone(), slot);
        inner.entries.push(Entry {
            id: id.clone(),
            callback,
            interest,
        });
        info!(subscriber = %id, slot, "Registered subscriber");
        Ok(slot)
    }

    /// Replace the interest mask of a registered subscriber
    pub fn set_interest(&self, id: &SubscriberId, interest: EventMask) -> IntfResult<()> {
        debug!(subscriber = %id, %interest, "SubscriberRegistry::set_interest: called");
        let mut inner = self.inner.write();
        let slot = *inner
            .index
            .get(id)
            .ok_or_else(|| IntfError::UnknownSubscriber(id.clone()))?;
        inner.entries[slot].interest = interest;
        Ok(())
    }

    /// Ids of subscribers interested in `event`, in registration order
    pub fn interested_subscribers(&self, event: PortEvent) -> Vec<SubscriberId> {
        self.interested(event).into_iter().map(|s| s.id).collect()
    }

    /// Snapshot of subscribers interested in `event`, with their callbacks
    pub fn interested(&self, event: PortEvent) -> Vec<Interested> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.interest.contains(event))
            .map(|(slot, entry)| Interested {
                slot,
                id: entry.id.clone(),
                callback: Arc::clone(&entry.callback),
            })
            .collect()
    }

    pub fn slot_of(&self, id: &SubscriberId) -> Option<usize> {
        self.inner.read().index.get(id).copied()
    }

    pub fn id_at(&self, slot: usize) -> Option<SubscriberId> {
        self.inner.read().entries.get(slot).map(|entry| entry.id.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventNotice;

    fn accept() -> Arc<dyn Subscriber> {
        Arc::new(|_: &EventNotice| true)
    }

    #[test]
    fn test_register_duplicate() {
        let registry = SubscriberRegistry::new();
        let mask = EventMask::empty().with(PortEvent::LinkUp);
        assert_eq!(registry.register("authmgr".into(), accept(), mask).unwrap(), 0);
        assert_eq!(
            registry.register("authmgr".into(), accept(), mask).unwrap_err(),
            IntfError::DuplicateRegistration("authmgr".into())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_interested_in_registration_order() {
        let registry = SubscriberRegistry::new();
        let link = EventMask::empty().with(PortEvent::LinkUp);
        registry.register("zeta".into(), accept(), link).unwrap();
        registry.register("alpha".into(), accept(), EventMask::all()).unwrap();
        registry
            .register("mab".into(), accept(), EventMask::empty().with(PortEvent::Attach))
            .unwrap();

        let ids = registry.interested_subscribers(PortEvent::LinkUp);
        assert_eq!(ids, vec![SubscriberId::from("zeta"), SubscriberId::from("alpha")]);

        let slots: Vec<usize> = registry.interested(PortEvent::Attach).iter().map(|s| s.slot).collect();
        assert_eq!(slots, vec![1, 2]);
    }

    #[test]
    fn test_set_interest() {
        let registry = SubscriberRegistry::new();
        registry.register("vlan".into(), accept(), EventMask::empty()).unwrap();
        assert!(registry.interested_subscribers(PortEvent::Create).is_empty());

        registry
            .set_interest(&"vlan".into(), EventMask::empty().with(PortEvent::Create))
            .unwrap();
        assert_eq!(registry.interested_subscribers(PortEvent::Create).len(), 1);

        assert_eq!(
            registry.set_interest(&"ghost".into(), EventMask::all()),
            Err(IntfError::UnknownSubscriber("ghost".into()))
        );
    }

    #[test]
    fn test_slot_lookup() {
        let registry = SubscriberRegistry::new();
        registry.register("a".into(), accept(), EventMask::all()).unwrap();
        registry.register("b".into(), accept(), EventMask::all()).unwrap();
        assert_eq!(registry.slot_of(&"b".into()), Some(1));
        assert_eq!(registry.id_at(0), Some("a".into()));
        assert_eq!(registry.id_at(9), None);
    }
}
