//! Interface table and state machine

mod machine;
mod outcalls;
mod table;

pub use machine::{StateMachine, Step};
pub use outcalls::FollowOn;
pub use table::InterfaceTable;
