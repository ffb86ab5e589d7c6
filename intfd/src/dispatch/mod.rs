//! Dispatch loop and the public interface-manager handle
//!
//! A single task drains three lanes in priority order: internal requests
//! (follow-on events and startup replay), external requests submitted
//! through [`IntfManagerHandle`], and a periodic maintenance tick. One
//! request is processed at a time.

mod context;
mod core;
mod handle;
mod messages;
mod metrics;

pub use self::core::IntfManager;
pub use handle::{IntfManagerHandle, Registration};
pub use messages::{CompletionCallback, EventCompletion};
pub use metrics::{DispatchMetrics, TraceEntry, TraceStage};
