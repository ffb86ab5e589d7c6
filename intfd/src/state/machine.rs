//! Interface state machine
//!
//! Every event maps to one row of the transition table: the lifecycle
//! state it expects, what to do when it arrives out of order, the step
//! applied before the broadcast and the commit applied after a successful
//! one. Runtime-flag events expect no particular state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::outcalls::{self, FollowOn};
use super::table::InterfaceTable;
use crate::coordinator::{Broadcast, Coordinator, log_verdict};
use crate::correlator::Correlator;
use crate::domain::{CreateRequest, EventData, InterfaceRecord, IntfId, IntfState, IntfType, LifecycleStep, PortEvent};
use crate::error::{IntfError, IntfResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutOfOrder {
    /// Broadcast anyway and leave the lifecycle alone
    BestEffort,
    /// Refuse without broadcasting
    Reject,
}

type Commit = fn(&mut InterfaceRecord, &EventData);

struct Transition {
    expects: Option<IntfState>,
    /// State in which the event has nothing to do and succeeds at once
    satisfied_in: Option<IntfState>,
    otherwise: OutOfOrder,
    prepare: Option<LifecycleStep>,
    complete: Option<LifecycleStep>,
    commit: Commit,
}

impl Transition {
    fn lifecycle(expects: IntfState, otherwise: OutOfOrder, prepare: LifecycleStep, complete: LifecycleStep, commit: Commit) -> Self {
        Self {
            expects: Some(expects),
            satisfied_in: None,
            otherwise,
            prepare: Some(prepare),
            complete: Some(complete),
            commit,
        }
    }

    fn runtime(commit: Commit) -> Self {
        Self {
            expects: None,
            satisfied_in: None,
            otherwise: OutOfOrder::BestEffort,
            prepare: None,
            complete: None,
            commit,
        }
    }
}

fn transition(event: PortEvent) -> Transition {
    use IntfState as S;
    use LifecycleStep as L;
    use OutOfOrder::*;
    use PortEvent as E;

    match event {
        E::Create => Transition::lifecycle(S::Uninitialized, Reject, L::Create, L::CreateComplete, |r, _| {
            r.flags.created = true;
        }),
        E::Attach => Transition::lifecycle(S::Created, BestEffort, L::Attach, L::AttachComplete, |r, _| {
            r.flags.present = true;
        }),
        E::Detach => Transition {
            satisfied_in: Some(S::Created),
            ..Transition::lifecycle(S::Attached, BestEffort, L::Detach, L::DetachComplete, |r, _| {
                r.flags.present = false;
                r.link_change_time = Some(Utc::now());
            })
        },
        E::Delete => Transition::lifecycle(S::Created, Reject, L::Delete, L::DeleteComplete, |r, _| {
            r.flags.created = false;
        }),
        E::LinkUp => Transition::runtime(|r, _| set_link(r, true)),
        E::LinkDown => Transition::runtime(|r, _| set_link(r, false)),
        E::AdminEnable => Transition::runtime(|r, _| {
            r.flags.admin_enabled = true;
            r.flags.diag_disabled = false;
            r.diag_disabled_at = None;
        }),
        E::AdminDisable => Transition::runtime(|r, _| r.flags.admin_enabled = false),
        E::Forwarding => Transition::runtime(|r, _| r.flags.forwarding = true),
        E::NotForwarding => Transition::runtime(|r, _| r.flags.forwarding = false),
        E::Authorized => Transition::runtime(|r, _| r.flags.authorized = true),
        E::Unauthorized => Transition::runtime(|r, _| r.flags.authorized = false),
        E::Active => Transition::runtime(|r, _| r.flags.active = true),
        E::Inactive => Transition::runtime(|r, _| r.flags.active = false),
        E::PfcActive => Transition::runtime(|r, _| r.flags.pfc_active = true),
        E::PfcInactive => Transition::runtime(|r, _| r.flags.pfc_active = false),
        E::LagAcquire => Transition::runtime(|r, data| {
            r.flags.lag_member = true;
            if let EventData::LagMember { lag } = data {
                r.lag = Some(*lag);
            }
        }),
        E::LagRelease => Transition::runtime(|r, _| {
            r.flags.lag_member = false;
            r.lag = None;
        }),
        E::SpeedChange => Transition::runtime(|r, data| {
            if let EventData::Speed { mbps } = data {
                r.speed_mbps = Some(*mbps);
            }
        }),
        E::AuthAcquire
        | E::AuthRelease
        | E::RoutingEnabled
        | E::RoutingDisabled
        | E::DeletePending
        | E::LagCfgCreate
        | E::LagCfgMemberChange
        | E::LagCfgRemove
        | E::LagCfgEnd
        | E::StatsReset
        | E::EthernetSwitchport => Transition::runtime(|_, _| {}),
    }
}

fn set_link(record: &mut InterfaceRecord, up: bool) {
    record.flags.link_up = up;
    record.link_change_time = Some(Utc::now());
    if record.is_macro_port() {
        info!(intf = %record.id, name = %record.name, "Link {}", if up { "up" } else { "down" });
    }
}

/// What the dispatch loop learns from handling one event
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub result: IntfResult<()>,
    /// Events to announce next on the internal lane
    pub follow_ons: Vec<FollowOn>,
    /// Raw coordinator verdict; `None` when nothing was broadcast
    pub broadcast: Option<IntfResult<Broadcast>>,
    /// The event arrived out of order
    pub anomaly: bool,
}

impl Step {
    fn without_broadcast(result: IntfResult<()>, anomaly: bool) -> Self {
        Self {
            result,
            follow_ons: Vec::new(),
            broadcast: None,
            anomaly,
        }
    }
}

enum Admission {
    Reject { error: IntfError, anomaly: bool },
    Satisfied,
    Broadcast { prior: IntfState, in_order: bool },
}

/// Validates events against the interface table, runs the broadcast and
/// commits the outcome
pub struct StateMachine {
    table: Arc<InterfaceTable>,
    coordinator: Arc<Coordinator>,
}

impl StateMachine {
    pub fn new(table: Arc<InterfaceTable>, coordinator: Arc<Coordinator>) -> Self {
        Self { table, coordinator }
    }

    pub fn table(&self) -> &Arc<InterfaceTable> {
        &self.table
    }

    /// Insert a new record in `Uninitialized`, ready for its `Create` event
    pub fn add_interface(&self, request: &CreateRequest, default_admin_enabled: bool) -> IntfResult<()> {
        debug!(intf = %request.id, name = %request.name, "StateMachine::add_interface: called");
        self.table.insert(InterfaceRecord::new(request, default_admin_enabled))
    }

    /// Flag the interface diag-disabled; the caller follows with `AdminDisable`
    pub fn mark_diag_disabled(&self, intf: IntfId) -> IntfResult<()> {
        debug!(%intf, "StateMachine::mark_diag_disabled: called");
        self.table.update(intf, |r| {
            r.flags.diag_disabled = true;
            r.diag_disabled_at = Some(Utc::now());
        })?;
        warn!(%intf, "Interface diag-disabled");
        Ok(())
    }

    /// Handle one event end to end under `correlator`
    pub async fn handle(&self, correlator: Correlator, intf: IntfId, event: PortEvent, data: EventData) -> Step {
        debug!(%correlator, %intf, %event, "StateMachine::handle: called");
        let rule = transition(event);

        let (prior, in_order) = match self.admit(intf, event, &rule) {
            Admission::Reject { error, anomaly } => return Step::without_broadcast(Err(error), anomaly),
            Admission::Satisfied => return Step::without_broadcast(Ok(()), false),
            Admission::Broadcast { prior, in_order } => (prior, in_order),
        };

        if in_order && let Some(step) = rule.prepare {
            self.prepare(intf, event, step);
        }

        let broadcast = self.coordinator.begin_with(correlator, intf, event, data.clone()).await;
        log_verdict(correlator, intf, event, &broadcast);

        let (result, follow_ons) = match &broadcast {
            Ok(_) if in_order => (Ok(()), self.commit(intf, event, &rule, &data)),
            Ok(_) => (
                Err(IntfError::PreconditionViolation {
                    intf,
                    event,
                    state: prior,
                }),
                Vec::new(),
            ),
            Err(e) => {
                warn!(%intf, %event, state = %prior, subscribers = ?e.subscribers(), "Event not committed");
                if in_order {
                    self.rollback(intf, event, prior);
                }
                (Err(e.clone()), Vec::new())
            }
        };

        Step {
            result,
            follow_ons,
            broadcast: Some(broadcast),
            anomaly: !in_order,
        }
    }

    fn admit(&self, intf: IntfId, event: PortEvent, rule: &Transition) -> Admission {
        let known = self
            .table
            .get(intf)
            .filter(|r| event == PortEvent::Create || r.state != IntfState::Uninitialized);
        let Some(record) = known else {
            if event.is_teardown() {
                debug!(%intf, %event, "Event for unknown interface");
            } else {
                warn!(%intf, %event, "Event for unknown interface");
            }
            return Admission::Reject {
                error: IntfError::UnknownInterface(intf),
                anomaly: false,
            };
        };

        let state = record.state;
        match rule.expects {
            None => Admission::Broadcast {
                prior: state,
                in_order: true,
            },
            Some(expected) if expected == state => Admission::Broadcast {
                prior: state,
                in_order: true,
            },
            Some(_) if rule.satisfied_in == Some(state) => {
                debug!(%intf, %event, %state, "Nothing to do");
                Admission::Satisfied
            }
            Some(expected) => {
                let vlan_reattach = event == PortEvent::Attach && record.intf_type == IntfType::LogicalVlan;
                if !vlan_reattach {
                    warn!(%intf, %event, %state, %expected, "Event out of order");
                }
                match rule.otherwise {
                    OutOfOrder::BestEffort => Admission::Broadcast {
                        prior: state,
                        in_order: false,
                    },
                    OutOfOrder::Reject => Admission::Reject {
                        error: IntfError::PreconditionViolation { intf, event, state },
                        anomaly: true,
                    },
                }
            }
        }
    }

    fn prepare(&self, intf: IntfId, event: PortEvent, step: LifecycleStep) {
        let updated = self.table.update(intf, |r| {
            if let Some(next) = r.state.next(step) {
                r.state = next;
            }
            if event == PortEvent::Detach {
                r.flags.link_up = false;
                r.flags.forwarding = false;
            }
            r.state
        });
        match updated {
            Ok(state) => debug!(%intf, %event, %state, "StateMachine::prepare: transitioned"),
            Err(e) => warn!(%intf, %event, error = %e, "Interface vanished before broadcast"),
        }
    }

    fn commit(&self, intf: IntfId, event: PortEvent, rule: &Transition, data: &EventData) -> Vec<FollowOn> {
        let committed = self.table.update(intf, |r| {
            let before = r.clone();
            if let Some(step) = rule.complete
                && let Some(next) = r.state.next(step)
            {
                r.state = next;
            }
            (rule.commit)(r, data);
            (before, r.clone())
        });

        let (before, after) = match committed {
            Ok(records) => records,
            Err(e) => {
                warn!(%intf, %event, error = %e, "Interface vanished before commit");
                return Vec::new();
            }
        };
        debug!(%intf, %event, state = %after.state, "StateMachine::commit: committed");

        if event == PortEvent::Delete {
            self.table.remove(intf);
            info!(%intf, name = %after.name, "Interface deleted");
            return Vec::new();
        }
        if event == PortEvent::Create {
            info!(%intf, name = %after.name, kind = %after.intf_type, "Interface created");
        }

        outcalls::follow_ons(&self.table, event, &before, &after)
    }

    fn rollback(&self, intf: IntfId, event: PortEvent, prior: IntfState) {
        if event == PortEvent::Create {
            self.table.remove(intf);
            warn!(%intf, "Interface creation rewound");
            return;
        }
        if let Err(e) = self.table.update(intf, |r| r.state = prior) {
            warn!(%intf, %event, error = %e, "Interface vanished before rollback");
        } else {
            debug!(%intf, %event, state = %prior, "StateMachine::rollback: restored");
        }
    }
}
