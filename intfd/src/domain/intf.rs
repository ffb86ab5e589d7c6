//! Interface identity, lifecycle state and runtime flags

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable interface identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntfId(pub u32);

impl fmt::Display for IntfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for IntfId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Kind of interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IntfType {
    #[default]
    Physical,
    Lag,
    LogicalVlan,
    Cpu,
    ServicePort,
    Loopback,
    Tunnel,
}

impl fmt::Display for IntfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Physical => "physical",
            Self::Lag => "lag",
            Self::LogicalVlan => "logical-vlan",
            Self::Cpu => "cpu",
            Self::ServicePort => "service-port",
            Self::Loopback => "loopback",
            Self::Tunnel => "tunnel",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of an interface record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum IntfState {
    #[default]
    Uninitialized,
    Creating,
    Created,
    Attaching,
    Attached,
    Detaching,
    Deleting,
}

/// Step that drives the lifecycle table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Create,
    CreateComplete,
    Attach,
    AttachComplete,
    Detach,
    DetachComplete,
    Delete,
    DeleteComplete,
}

impl IntfState {
    /// Next state for `step`, or `None` when the step is not valid here.
    ///
    /// `DeleteComplete` yields `Uninitialized`: the record is gone.
    pub fn next(self, step: LifecycleStep) -> Option<IntfState> {
        use IntfState::*;
        use LifecycleStep as S;

        match (self, step) {
            (Uninitialized, S::Create) => Some(Creating),
            (Creating, S::CreateComplete) => Some(Created),
            (Created, S::Attach) => Some(Attaching),
            (Attaching, S::AttachComplete) => Some(Attached),
            (Attached, S::Detach) => Some(Detaching),
            (Detaching, S::DetachComplete) => Some(Created),
            (Created, S::Delete) => Some(Deleting),
            (Deleting, S::DeleteComplete) => Some(Uninitialized),
            _ => None,
        }
    }
}

impl fmt::Display for IntfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Attaching => "attaching",
            Self::Attached => "attached",
            Self::Detaching => "detaching",
            Self::Deleting => "deleting",
        };
        f.write_str(name)
    }
}

/// Boolean runtime masks tracked alongside the lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeFlags {
    pub created: bool,
    pub present: bool,
    pub link_up: bool,
    pub forwarding: bool,
    pub authorized: bool,
    pub active: bool,
    pub admin_enabled: bool,
    pub lag_member: bool,
    pub pfc_active: bool,
    pub diag_disabled: bool,
}

/// Parameters for creating a new interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CreateRequest {
    pub id: IntfId,
    pub name: String,
    #[serde(default, rename = "type")]
    pub intf_type: IntfType,
    /// Initial admin state; the configured default applies when unset
    #[serde(default)]
    pub admin_enabled: Option<bool>,
}

impl CreateRequest {
    pub fn new(id: impl Into<IntfId>, name: impl Into<String>, intf_type: IntfType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            intf_type,
            admin_enabled: None,
        }
    }

    pub fn with_admin_enabled(mut self, enabled: bool) -> Self {
        self.admin_enabled = Some(enabled);
        self
    }
}

/// Per-interface record owned by the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceRecord {
    pub id: IntfId,
    pub name: String,
    #[serde(rename = "type")]
    pub intf_type: IntfType,
    pub state: IntfState,
    pub flags: RuntimeFlags,
    /// Last speed announced with `SpeedChange`
    pub speed_mbps: Option<u32>,
    /// Aggregate that acquired this port
    pub lag: Option<IntfId>,
    pub link_change_time: Option<DateTime<Utc>>,
    pub diag_disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InterfaceRecord {
    /// New record in `Uninitialized`, not yet announced to anyone
    pub fn new(request: &CreateRequest, default_admin_enabled: bool) -> Self {
        let flags = RuntimeFlags {
            admin_enabled: request.admin_enabled.unwrap_or(default_admin_enabled),
            ..RuntimeFlags::default()
        };
        Self {
            id: request.id,
            name: request.name.clone(),
            intf_type: request.intf_type,
            state: IntfState::Uninitialized,
            flags,
            speed_mbps: None,
            lag: None,
            link_change_time: None,
            diag_disabled_at: None,
            created_at: Utc::now(),
        }
    }

    /// A port that forwards on its own, i.e. not acquired by a LAG
    pub fn is_macro_port(&self) -> bool {
        !self.flags.lag_member
    }

    pub fn is_lag(&self) -> bool {
        self.intf_type == IntfType::Lag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_happy_path() {
        let mut state = IntfState::Uninitialized;
        for step in [
            LifecycleStep::Create,
            LifecycleStep::CreateComplete,
            LifecycleStep::Attach,
            LifecycleStep::AttachComplete,
            LifecycleStep::Detach,
            LifecycleStep::DetachComplete,
            LifecycleStep::Delete,
        ] {
            state = state.next(step).unwrap();
        }
        assert_eq!(state, IntfState::Deleting);
        assert_eq!(state.next(LifecycleStep::DeleteComplete), Some(IntfState::Uninitialized));
    }

    #[test]
    fn test_lifecycle_rejects_out_of_order() {
        assert_eq!(IntfState::Uninitialized.next(LifecycleStep::Attach), None);
        assert_eq!(IntfState::Attached.next(LifecycleStep::Delete), None);
        assert_eq!(IntfState::Created.next(LifecycleStep::Detach), None);
    }

    #[test]
    fn test_record_uses_default_admin_state() {
        let request = CreateRequest::new(1, "Ethernet0", IntfType::Physical);
        assert!(InterfaceRecord::new(&request, true).flags.admin_enabled);
        assert!(!InterfaceRecord::new(&request, false).flags.admin_enabled);

        let request = request.with_admin_enabled(false);
        assert!(!InterfaceRecord::new(&request, true).flags.admin_enabled);
    }

    #[test]
    fn test_macro_port() {
        let request = CreateRequest::new(4, "Ethernet4", IntfType::Physical);
        let mut record = InterfaceRecord::new(&request, true);
        assert!(record.is_macro_port());
        record.flags.lag_member = true;
        assert!(!record.is_macro_port());
    }

    #[test]
    fn test_create_request_yaml() {
        let yaml = "id: 7\nname: PortChannel1\ntype: lag\n";
        let request: CreateRequest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.id, IntfId(7));
        assert_eq!(request.intf_type, IntfType::Lag);
        assert_eq!(request.admin_enabled, None);
    }
}
