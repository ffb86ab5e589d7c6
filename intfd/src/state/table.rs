//! Interface table
//!
//! Records are written only by the state machine on the dispatch task;
//! everyone else reads snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{InterfaceRecord, IntfId, IntfState};
use crate::error::{IntfError, IntfResult};

#[derive(Debug, Default)]
pub struct InterfaceTable {
    records: RwLock<BTreeMap<IntfId, InterfaceRecord>>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, record: InterfaceRecord) -> IntfResult<()> {
        debug!(intf = %record.id, name = %record.name, "InterfaceTable::insert: called");
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(IntfError::DuplicateInterface(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    pub(crate) fn remove(&self, intf: IntfId) -> Option<InterfaceRecord> {
        debug!(%intf, "InterfaceTable::remove: called");
        self.records.write().remove(&intf)
    }

    /// Apply `f` to the record and return what it returns
    pub(crate) fn update<T>(&self, intf: IntfId, f: impl FnOnce(&mut InterfaceRecord) -> T) -> IntfResult<T> {
        let mut records = self.records.write();
        let record = records.get_mut(&intf).ok_or(IntfError::UnknownInterface(intf))?;
        Ok(f(record))
    }

    pub fn contains(&self, intf: IntfId) -> bool {
        self.records.read().contains_key(&intf)
    }

    pub fn get(&self, intf: IntfId) -> Option<InterfaceRecord> {
        self.records.read().get(&intf).cloned()
    }

    /// Lifecycle state; interfaces that are not known report `Uninitialized`
    pub fn get_state(&self, intf: IntfId) -> IntfState {
        self.records
            .read()
            .get(&intf)
            .map(|r| r.state)
            .unwrap_or(IntfState::Uninitialized)
    }

    pub fn is_link_up(&self, intf: IntfId) -> IntfResult<bool> {
        self.flag(intf, |r| r.flags.link_up)
    }

    pub fn is_forwarding(&self, intf: IntfId) -> IntfResult<bool> {
        self.flag(intf, |r| r.flags.forwarding)
    }

    pub fn is_authorized(&self, intf: IntfId) -> IntfResult<bool> {
        self.flag(intf, |r| r.flags.authorized)
    }

    fn flag(&self, intf: IntfId, f: impl Fn(&InterfaceRecord) -> bool) -> IntfResult<bool> {
        self.records
            .read()
            .get(&intf)
            .map(f)
            .ok_or(IntfError::UnknownInterface(intf))
    }

    /// Snapshot of every record, ordered by id
    pub fn list(&self) -> Vec<InterfaceRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Current members of `lag`
    pub(crate) fn lag_members(&self, lag: IntfId) -> Vec<InterfaceRecord> {
        self.records
            .read()
            .values()
            .filter(|r| r.flags.lag_member && r.lag == Some(lag))
            .cloned()
            .collect()
    }

    /// Interfaces diag-disabled at or before `cutoff`
    pub fn diag_disabled_before(&self, cutoff: DateTime<Utc>) -> Vec<IntfId> {
        self.records
            .read()
            .values()
            .filter(|r| r.flags.diag_disabled && r.diag_disabled_at.is_some_and(|at| at <= cutoff))
            .map(|r| r.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::{CreateRequest, IntfType};

    fn record(id: u32) -> InterfaceRecord {
        InterfaceRecord::new(&CreateRequest::new(id, format!("Ethernet{}", id), IntfType::Physical), true)
    }

    #[test]
    fn test_insert_duplicate() {
        let table = InterfaceTable::new();
        table.insert(record(1)).unwrap();
        assert_eq!(table.insert(record(1)), Err(IntfError::DuplicateInterface(IntfId(1))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_queries_on_unknown_interface() {
        let table = InterfaceTable::new();
        assert_eq!(table.get_state(IntfId(9)), IntfState::Uninitialized);
        assert_eq!(table.is_link_up(IntfId(9)), Err(IntfError::UnknownInterface(IntfId(9))));
    }

    #[test]
    fn test_update_and_query_flags() {
        let table = InterfaceTable::new();
        table.insert(record(2)).unwrap();
        table
            .update(IntfId(2), |r| {
                r.flags.link_up = true;
                r.flags.authorized = true;
            })
            .unwrap();
        assert_eq!(table.is_link_up(IntfId(2)), Ok(true));
        assert_eq!(table.is_authorized(IntfId(2)), Ok(true));
        assert_eq!(table.is_forwarding(IntfId(2)), Ok(false));
    }

    #[test]
    fn test_diag_disabled_before() {
        let table = InterfaceTable::new();
        let now = Utc::now();
        for (id, ago) in [(1, 120), (2, 10)] {
            let mut r = record(id);
            r.flags.diag_disabled = true;
            r.diag_disabled_at = Some(now - Duration::seconds(ago));
            table.insert(r).unwrap();
        }
        table.insert(record(3)).unwrap();

        let expired = table.diag_disabled_before(now - Duration::seconds(60));
        assert_eq!(expired, vec![IntfId(1)]);
    }
}
