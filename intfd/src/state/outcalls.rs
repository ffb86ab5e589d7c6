//! Follow-on events derived from a committed event
//!
//! Most follow-ons target the interface that changed. PFC changes on a
//! LAG member, or a change in LAG membership, can also flip the PFC state
//! of the owning LAG, which is announced on the LAG itself.

use super::table::InterfaceTable;
use crate::domain::{InterfaceRecord, IntfId, IntfType, PortEvent};

/// An event to announce next, and the interface it is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowOn {
    pub intf: IntfId,
    pub event: PortEvent,
}

impl FollowOn {
    pub fn new(intf: IntfId, event: PortEvent) -> Self {
        Self { intf, event }
    }
}

/// Everything to announce after `event` committed on `after.id`.
///
/// `table` must already hold the committed record.
pub(crate) fn follow_ons(
    table: &InterfaceTable,
    event: PortEvent,
    before: &InterfaceRecord,
    after: &InterfaceRecord,
) -> Vec<FollowOn> {
    same_port(event, before, after)
        .into_iter()
        .map(|next| FollowOn::new(after.id, next))
        .chain(owning_lag(table, event, before, after))
        .collect()
}

fn same_port(event: PortEvent, before: &InterfaceRecord, after: &InterfaceRecord) -> Vec<PortEvent> {
    let macro_port = after.is_macro_port();
    let flags = &after.flags;

    let next = match event {
        PortEvent::Attach if flags.link_up => Some(PortEvent::LinkUp),
        PortEvent::LinkUp if macro_port && flags.admin_enabled => Some(PortEvent::Authorized),
        PortEvent::AdminEnable if macro_port && flags.link_up => Some(PortEvent::Authorized),
        PortEvent::LinkDown if (macro_port && before.flags.forwarding) || after.is_lag() => {
            Some(PortEvent::Unauthorized)
        }
        PortEvent::AdminDisable if macro_port && flags.link_up => Some(PortEvent::Unauthorized),
        PortEvent::Authorized => Some(PortEvent::Forwarding),
        PortEvent::Unauthorized => Some(PortEvent::NotForwarding),
        PortEvent::Forwarding if flags.authorized => Some(PortEvent::Active),
        PortEvent::NotForwarding => Some(PortEvent::Inactive),
        _ => None,
    };

    next.into_iter().collect()
}

/// PFC change for the LAG that `after` joined, left or belongs to
fn owning_lag(
    table: &InterfaceTable,
    event: PortEvent,
    before: &InterfaceRecord,
    after: &InterfaceRecord,
) -> Option<FollowOn> {
    if after.intf_type != IntfType::Physical {
        return None;
    }
    let lag_id = match event {
        PortEvent::LagAcquire | PortEvent::PfcActive | PortEvent::PfcInactive => after.lag?,
        PortEvent::LagRelease => before.lag?,
        _ => return None,
    };
    let lag = table.get(lag_id)?;
    let members = table.lag_members(lag_id);
    let now_active = !members.is_empty() && members.iter().all(|m| m.flags.pfc_active);

    let next = match (lag.flags.pfc_active, now_active) {
        (false, true) if event != PortEvent::PfcInactive => PortEvent::PfcActive,
        (true, false) if event != PortEvent::PfcActive => PortEvent::PfcInactive,
        _ => return None,
    };
    Some(FollowOn::new(lag_id, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CreateRequest;

    fn port(intf_type: IntfType) -> InterfaceRecord {
        InterfaceRecord::new(&CreateRequest::new(1, "Ethernet0", intf_type), true)
    }

    #[test]
    fn test_link_up_authorizes_admin_enabled_macro_port() {
        let before = port(IntfType::Physical);
        let mut after = before.clone();
        after.flags.link_up = true;
        assert_eq!(same_port(PortEvent::LinkUp, &before, &after), vec![PortEvent::Authorized]);

        after.flags.admin_enabled = false;
        assert!(same_port(PortEvent::LinkUp, &before, &after).is_empty());
    }

    #[test]
    fn test_lag_member_gets_no_outcall() {
        let mut before = port(IntfType::Physical);
        before.flags.lag_member = true;
        before.flags.forwarding = true;
        let mut after = before.clone();
        after.flags.link_up = true;
        assert!(same_port(PortEvent::LinkUp, &before, &after).is_empty());

        after.flags.link_up = false;
        assert!(same_port(PortEvent::LinkDown, &before, &after).is_empty());
    }

    #[test]
    fn test_link_down_needs_forwarding_unless_lag() {
        let before = port(IntfType::Physical);
        assert!(same_port(PortEvent::LinkDown, &before, &before).is_empty());

        let mut forwarding = before.clone();
        forwarding.flags.forwarding = true;
        assert_eq!(
            same_port(PortEvent::LinkDown, &forwarding, &before),
            vec![PortEvent::Unauthorized]
        );

        let lag = port(IntfType::Lag);
        assert_eq!(same_port(PortEvent::LinkDown, &lag, &lag), vec![PortEvent::Unauthorized]);
    }

    #[test]
    fn test_authorization_chain() {
        let mut r = port(IntfType::Physical);
        assert_eq!(same_port(PortEvent::Authorized, &r, &r), vec![PortEvent::Forwarding]);
        assert!(same_port(PortEvent::Forwarding, &r, &r).is_empty());
        r.flags.authorized = true;
        assert_eq!(same_port(PortEvent::Forwarding, &r, &r), vec![PortEvent::Active]);
        assert_eq!(same_port(PortEvent::Unauthorized, &r, &r), vec![PortEvent::NotForwarding]);
        assert_eq!(same_port(PortEvent::NotForwarding, &r, &r), vec![PortEvent::Inactive]);
    }

    #[test]
    fn test_attach_replays_link_up() {
        let mut r = port(IntfType::Physical);
        assert!(same_port(PortEvent::Attach, &r, &r).is_empty());
        r.flags.link_up = true;
        assert_eq!(same_port(PortEvent::Attach, &r, &r), vec![PortEvent::LinkUp]);
    }

    fn lag_fixture() -> InterfaceTable {
        let table = InterfaceTable::new();
        table
            .insert(InterfaceRecord::new(&CreateRequest::new(100, "PortChannel1", IntfType::Lag), true))
            .unwrap();
        for id in [1u32, 2] {
            let mut member = InterfaceRecord::new(&CreateRequest::new(id, format!("Ethernet{}", id), IntfType::Physical), true);
            member.flags.lag_member = true;
            member.lag = Some(IntfId(100));
            table.insert(member).unwrap();
        }
        table
    }

    fn set_pfc(table: &InterfaceTable, intf: u32, active: bool) -> (InterfaceRecord, InterfaceRecord) {
        table
            .update(IntfId(intf), |r| {
                let before = r.clone();
                r.flags.pfc_active = active;
                (before, r.clone())
            })
            .unwrap()
    }

    #[test]
    fn test_lag_pfc_active_once_every_member_is() {
        let table = lag_fixture();

        let (before, after) = set_pfc(&table, 1, true);
        assert!(follow_ons(&table, PortEvent::PfcActive, &before, &after).is_empty());

        let (before, after) = set_pfc(&table, 2, true);
        assert_eq!(
            follow_ons(&table, PortEvent::PfcActive, &before, &after),
            vec![FollowOn::new(IntfId(100), PortEvent::PfcActive)]
        );
    }

    #[test]
    fn test_lag_pfc_inactive_when_any_member_drops() {
        let table = lag_fixture();
        set_pfc(&table, 1, true);
        set_pfc(&table, 2, true);
        table.update(IntfId(100), |r| r.flags.pfc_active = true).unwrap();

        let (before, after) = set_pfc(&table, 2, false);
        assert_eq!(
            follow_ons(&table, PortEvent::PfcInactive, &before, &after),
            vec![FollowOn::new(IntfId(100), PortEvent::PfcInactive)]
        );

        // Already inactive
        table.update(IntfId(100), |r| r.flags.pfc_active = false).unwrap();
        let (before, after) = set_pfc(&table, 1, false);
        assert!(follow_ons(&table, PortEvent::PfcInactive, &before, &after).is_empty());
    }

    #[test]
    fn test_membership_change_recomputes_lag_pfc() {
        let table = lag_fixture();
        set_pfc(&table, 1, true);
        table.update(IntfId(100), |r| r.flags.pfc_active = false).unwrap();

        // Member 2 is not PFC active; releasing it leaves only member 1
        let (before, after) = table
            .update(IntfId(2), |r| {
                let before = r.clone();
                r.flags.lag_member = false;
                r.lag = None;
                (before, r.clone())
            })
            .unwrap();
        assert_eq!(
            follow_ons(&table, PortEvent::LagRelease, &before, &after),
            vec![FollowOn::new(IntfId(100), PortEvent::PfcActive)]
        );

        // Rejoining without PFC makes the LAG inactive again
        table.update(IntfId(100), |r| r.flags.pfc_active = true).unwrap();
        let (before, after) = table
            .update(IntfId(2), |r| {
                let before = r.clone();
                r.flags.lag_member = true;
                r.lag = Some(IntfId(100));
                (before, r.clone())
            })
            .unwrap();
        assert_eq!(
            follow_ons(&table, PortEvent::LagAcquire, &before, &after),
            vec![FollowOn::new(IntfId(100), PortEvent::PfcInactive)]
        );
    }

    #[test]
    fn test_lag_itself_gets_no_lag_follow_on() {
        let table = lag_fixture();
        let lag = table.get(IntfId(100)).unwrap();
        assert!(follow_ons(&table, PortEvent::PfcActive, &lag, &lag).is_empty());
    }

    #[test]
    fn test_same_port_follow_ons_target_the_port() {
        let table = InterfaceTable::new();
        let before = port(IntfType::Physical);
        let mut after = before.clone();
        after.flags.link_up = true;
        assert_eq!(
            follow_ons(&table, PortEvent::LinkUp, &before, &after),
            vec![FollowOn::new(IntfId(1), PortEvent::Authorized)]
        );
    }
}
