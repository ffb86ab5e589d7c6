//! Port events and event-interest masks

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::intf::IntfId;

/// Closed set of interface events announced to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum PortEvent {
    Create = 0,
    Delete,
    Attach,
    Detach,
    LinkUp,
    LinkDown,
    AdminEnable,
    AdminDisable,
    Forwarding,
    NotForwarding,
    Authorized,
    Unauthorized,
    LagAcquire,
    LagRelease,
    AuthAcquire,
    AuthRelease,
    SpeedChange,
    RoutingEnabled,
    RoutingDisabled,
    DeletePending,
    LagCfgCreate,
    LagCfgMemberChange,
    LagCfgRemove,
    LagCfgEnd,
    StatsReset,
    PfcActive,
    PfcInactive,
    EthernetSwitchport,
    Active,
    Inactive,
}

impl PortEvent {
    /// Every event, in mask-bit order
    pub const ALL: [PortEvent; 30] = [
        PortEvent::Create,
        PortEvent::Delete,
        PortEvent::Attach,
        PortEvent::Detach,
        PortEvent::LinkUp,
        PortEvent::LinkDown,
        PortEvent::AdminEnable,
        PortEvent::AdminDisable,
        PortEvent::Forwarding,
        PortEvent::NotForwarding,
        PortEvent::Authorized,
        PortEvent::Unauthorized,
        PortEvent::LagAcquire,
        PortEvent::LagRelease,
        PortEvent::AuthAcquire,
        PortEvent::AuthRelease,
        PortEvent::SpeedChange,
        PortEvent::RoutingEnabled,
        PortEvent::RoutingDisabled,
        PortEvent::DeletePending,
        PortEvent::LagCfgCreate,
        PortEvent::LagCfgMemberChange,
        PortEvent::LagCfgRemove,
        PortEvent::LagCfgEnd,
        PortEvent::StatsReset,
        PortEvent::PfcActive,
        PortEvent::PfcInactive,
        PortEvent::EthernetSwitchport,
        PortEvent::Active,
        PortEvent::Inactive,
    ];

    /// Bit for this event inside an [`EventMask`]
    pub fn bit(self) -> u64 {
        1u64 << (self as u8)
    }

    /// Kebab-case name, matching the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Attach => "attach",
            Self::Detach => "detach",
            Self::LinkUp => "link-up",
            Self::LinkDown => "link-down",
            Self::AdminEnable => "admin-enable",
            Self::AdminDisable => "admin-disable",
            Self::Forwarding => "forwarding",
            Self::NotForwarding => "not-forwarding",
            Self::Authorized => "authorized",
            Self::Unauthorized => "unauthorized",
            Self::LagAcquire => "lag-acquire",
            Self::LagRelease => "lag-release",
            Self::AuthAcquire => "auth-acquire",
            Self::AuthRelease => "auth-release",
            Self::SpeedChange => "speed-change",
            Self::RoutingEnabled => "routing-enabled",
            Self::RoutingDisabled => "routing-disabled",
            Self::DeletePending => "delete-pending",
            Self::LagCfgCreate => "lag-cfg-create",
            Self::LagCfgMemberChange => "lag-cfg-member-change",
            Self::LagCfgRemove => "lag-cfg-remove",
            Self::LagCfgEnd => "lag-cfg-end",
            Self::StatsReset => "stats-reset",
            Self::PfcActive => "pfc-active",
            Self::PfcInactive => "pfc-inactive",
            Self::EthernetSwitchport => "ethernet-switchport",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Events that tear an interface down.
    ///
    /// These routinely arrive for interfaces that are already gone, so they
    /// are not worth a warning when the target is unknown.
    pub fn is_teardown(self) -> bool {
        matches!(
            self,
            Self::LinkDown
                | Self::Unauthorized
                | Self::AdminDisable
                | Self::NotForwarding
                | Self::EthernetSwitchport
                | Self::Inactive
        )
    }
}

impl fmt::Display for PortEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == wanted)
            .ok_or_else(|| format!("Unknown port event: {}", s))
    }
}

/// Set of events a subscriber wants to hear about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventMask(u64);

impl EventMask {
    /// Mask with no events
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Mask with every event
    pub fn all() -> Self {
        Self::ALL_BITS
    }

    const ALL_BITS: Self = Self((1u64 << PortEvent::ALL.len()) - 1);

    /// Raw bit representation
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Builder-style insert
    pub fn with(mut self, event: PortEvent) -> Self {
        self.insert(event);
        self
    }

    pub fn insert(&mut self, event: PortEvent) {
        self.0 |= event.bit();
    }

    pub fn remove(&mut self, event: PortEvent) {
        self.0 &= !event.bit();
    }

    pub fn contains(self, event: PortEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Events in the mask, in bit order
    pub fn iter(self) -> impl Iterator<Item = PortEvent> {
        PortEvent::ALL.into_iter().filter(move |event| self.contains(*event))
    }
}

impl FromIterator<PortEvent> for EventMask {
    fn from_iter<I: IntoIterator<Item = PortEvent>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |mask, event| mask.with(event))
    }
}

impl From<&[PortEvent]> for EventMask {
    fn from(events: &[PortEvent]) -> Self {
        events.iter().copied().collect()
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(PortEvent::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Event-specific payload handed to subscribers alongside the event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum EventData {
    #[default]
    None,
    /// New operational speed for [`PortEvent::SpeedChange`]
    Speed { mbps: u32 },
    /// Owning aggregate for LAG membership events
    LagMember { lag: IntfId },
    /// Free-form data for events this crate does not interpret
    Custom { value: serde_json::Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bits_are_unique() {
        let mut seen = 0u64;
        for event in PortEvent::ALL {
            assert_eq!(seen & event.bit(), 0, "duplicate bit for {}", event);
            seen |= event.bit();
        }
        assert_eq!(EventMask::all().bits(), seen);
    }

    #[test]
    fn test_event_parse() {
        assert_eq!("link-up".parse::<PortEvent>().unwrap(), PortEvent::LinkUp);
        assert_eq!("LAG_ACQUIRE".parse::<PortEvent>().unwrap(), PortEvent::LagAcquire);
        assert!("link-sideways".parse::<PortEvent>().is_err());
    }

    #[test]
    fn test_event_serde_matches_display() {
        for event in PortEvent::ALL {
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event));
        }
    }

    #[test]
    fn test_mask_insert_remove() {
        let mut mask = EventMask::empty().with(PortEvent::LinkUp).with(PortEvent::LinkDown);
        assert!(mask.contains(PortEvent::LinkUp));
        assert!(!mask.contains(PortEvent::Attach));
        assert_eq!(mask.len(), 2);

        mask.remove(PortEvent::LinkUp);
        assert!(!mask.contains(PortEvent::LinkUp));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![PortEvent::LinkDown]);
    }

    #[test]
    fn test_mask_display() {
        let mask: EventMask = [PortEvent::Attach, PortEvent::Create].as_slice().into();
        assert_eq!(mask.to_string(), "[create, attach]");
    }

    #[test]
    fn test_teardown_events() {
        assert!(PortEvent::LinkDown.is_teardown());
        assert!(PortEvent::Inactive.is_teardown());
        assert!(!PortEvent::LinkUp.is_teardown());
        assert!(!PortEvent::Attach.is_teardown());
    }

    #[test]
    fn test_event_data_serde() {
        let data = EventData::Speed { mbps: 25_000 };
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"kind\":\"speed\""));
        let back: EventData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
