//! Domain types for the interface manager
//!
//! Value types shared by every layer: interfaces and their lifecycle,
//! port events and interest masks, subscribers and startup phases.

mod event;
mod intf;
mod priority;
mod subscriber;

pub use event::{EventData, EventMask, PortEvent};
pub use intf::{CreateRequest, InterfaceRecord, IntfId, IntfState, IntfType, LifecycleStep, RuntimeFlags};
pub use priority::Priority;
pub use subscriber::{
    EventNotice, Outcome, StartupDone, StartupHook, StartupPhase, Subscriber, SubscriberId,
};
