//! Subscriber and startup-hook registries

mod mask;
mod startup;
mod subscribers;

pub use mask::SubscriberMask;
pub use startup::{Replay, StartupEntry, StartupRegistry};
pub use subscribers::{Interested, SubscriberRegistry};
