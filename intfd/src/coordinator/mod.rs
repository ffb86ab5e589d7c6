//! Broadcast coordinator and tally engine
//!
//! Runs one fan-out/quorum transaction at a time:
//! - **Begin:** select interested subscribers, open the single transaction
//!   slot, invoke every callback, then wait for quorum or the deadline
//! - **Report:** tally one subscriber's outcome against the open slot

mod config;
mod core;
mod transaction;

pub use config::CoordinatorConfig;
pub use self::core::{Broadcast, Coordinator};
pub(crate) use self::core::log_verdict;
pub use transaction::Completion;
