//! Requests carried by the dispatch lanes

use std::fmt;

use crate::correlator::Correlator;
use crate::domain::{CreateRequest, EventData, IntfId, PortEvent, SubscriberId};
use crate::error::IntfResult;

/// Final verdict handed to the originator of an event
#[derive(Debug, Clone, PartialEq)]
pub struct EventCompletion {
    pub correlator: Correlator,
    pub intf: IntfId,
    pub event: PortEvent,
    pub result: IntfResult<()>,
}

/// Invoked exactly once, after the state machine has committed
pub type CompletionCallback = Box<dyn FnOnce(EventCompletion) + Send>;

/// Requests to the dispatch task
pub(crate) enum Request {
    /// Announce an event and run it through the state machine
    Notify {
        correlator: Correlator,
        intf: IntfId,
        event: PortEvent,
        data: EventData,
        completion: Option<CompletionCallback>,
    },

    /// Add an interface record and announce `Create`
    Create {
        correlator: Correlator,
        request: CreateRequest,
        completion: Option<CompletionCallback>,
    },

    /// Mark an interface diag-disabled and announce `AdminDisable`
    DiagDisable {
        correlator: Correlator,
        intf: IntfId,
        completion: Option<CompletionCallback>,
    },

    /// Run startup hooks; `only` limits the run to one late joiner
    Startup { only: Option<SubscriberId> },

    /// Stop the dispatch task
    Shutdown,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notify {
                correlator,
                intf,
                event,
                data,
                completion,
            } => f
                .debug_struct("Notify")
                .field("correlator", correlator)
                .field("intf", intf)
                .field("event", event)
                .field("data", data)
                .field("completion", &completion.is_some())
                .finish(),
            Self::Create {
                correlator,
                request,
                completion,
            } => f
                .debug_struct("Create")
                .field("correlator", correlator)
                .field("request", request)
                .field("completion", &completion.is_some())
                .finish(),
            Self::DiagDisable {
                correlator,
                intf,
                completion,
            } => f
                .debug_struct("DiagDisable")
                .field("correlator", correlator)
                .field("intf", intf)
                .field("completion", &completion.is_some())
                .finish(),
            Self::Startup { only } => f.debug_struct("Startup").field("only", only).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}
