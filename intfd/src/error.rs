//! Error taxonomy for the interface manager

use thiserror::Error;

use crate::domain::{IntfId, IntfState, PortEvent, SubscriberId};

/// Errors returned by the registry, allocator, coordinator and state machine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntfError {
    #[error("Subscriber {0} is already registered")]
    DuplicateRegistration(SubscriberId),

    #[error("Subscriber {0} is not registered")]
    UnknownSubscriber(SubscriberId),

    #[error("Correlator pool exhausted: all {in_use} correlators in use")]
    PoolExhausted { in_use: usize },

    #[error("Correlator {value} outside pool [1, {size})")]
    CorrelatorOutOfRange { value: u32, size: u32 },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Event {event} out of order for interface {intf} in state {state}")]
    PreconditionViolation {
        intf: IntfId,
        event: PortEvent,
        state: IntfState,
    },

    #[error("Event timed out, no report from {}", join_ids(.pending))]
    Timeout { pending: Vec<SubscriberId> },

    #[error("Event failed by {}", join_ids(.failed))]
    SubscriberFailure { failed: Vec<SubscriberId> },

    #[error("Unknown interface {0}")]
    UnknownInterface(IntfId),

    #[error("Interface {0} already exists")]
    DuplicateInterface(IntfId),

    #[error("Dispatcher channel closed")]
    ChannelClosed,
}

impl IntfError {
    /// Subscribers blamed by a failed broadcast
    pub fn subscribers(&self) -> &[SubscriberId] {
        match self {
            Self::Timeout { pending } => pending,
            Self::SubscriberFailure { failed } => failed,
            _ => &[],
        }
    }
}

fn join_ids(ids: &[SubscriberId]) -> String {
    ids.iter().map(SubscriberId::as_str).collect::<Vec<_>>().join(", ")
}

/// Result alias used throughout the library
pub type IntfResult<T> = Result<T, IntfError>;
