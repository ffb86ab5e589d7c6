//! intfd - interface event coordinator
//!
//! A single authority that announces interface lifecycle events to every
//! interested subsystem, waits until all of them have reacted, folds their
//! outcomes into one verdict and advances a per-interface state machine.
//!
//! # Core Concepts
//!
//! - **One transaction at a time**: a single slot serializes every broadcast
//! - **Quorum or deadline**: a broadcast ends when every subscriber has
//!   reported or its deadline passes
//! - **Commit on success**: lifecycle state only advances on a clean verdict
//!
//! # Modules
//!
//! - [`domain`] - Interfaces, events, subscribers
//! - [`registry`] - Subscriber and startup-hook registries
//! - [`correlator`] - Transaction identifiers
//! - [`coordinator`] - Fan-out and tally engine
//! - [`state`] - Interface table and state machine
//! - [`dispatch`] - Dispatch loop and public handle
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod correlator;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod registry;
pub mod simulate;
pub mod state;

// Re-export commonly used types
pub use config::{Config, InterfaceDefaults, RecoveryConfig};
pub use coordinator::{Broadcast, Coordinator, CoordinatorConfig};
pub use correlator::{Correlator, CorrelatorPool};
pub use dispatch::{
    CompletionCallback, DispatchMetrics, EventCompletion, IntfManager, IntfManagerHandle, Registration, TraceEntry,
    TraceStage,
};
pub use domain::{
    CreateRequest, EventData, EventMask, EventNotice, InterfaceRecord, IntfId, IntfState, IntfType, Outcome, PortEvent,
    Priority, RuntimeFlags, StartupDone, StartupHook, StartupPhase, Subscriber, SubscriberId,
};
pub use error::{IntfError, IntfResult};
pub use state::{FollowOn, InterfaceTable, StateMachine};
