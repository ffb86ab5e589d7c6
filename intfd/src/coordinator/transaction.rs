//! The in-flight transaction record

use tokio::time::Instant;

use crate::correlator::Correlator;
use crate::domain::{EventData, IntfId, Outcome, PortEvent};
use crate::registry::SubscriberMask;

/// Published on the completion channel once every subscriber has reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub correlator: Correlator,
    pub event: PortEvent,
    pub response: Outcome,
}

/// Result of tallying one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tally {
    /// Recorded; `done` is true when this was the last outstanding report
    Recorded { done: bool },
    /// The slot had already reported or was never notified
    NotOutstanding,
}

/// State of the single open broadcast
#[derive(Debug)]
pub(crate) struct Transaction {
    pub correlator: Correlator,
    pub intf: IntfId,
    pub event: PortEvent,
    pub data: EventData,
    pub remaining: SubscriberMask,
    pub failed: SubscriberMask,
    pub response: Outcome,
    pub deadline: Instant,
}

impl Transaction {
    pub fn open(
        correlator: Correlator,
        intf: IntfId,
        event: PortEvent,
        data: EventData,
        remaining: SubscriberMask,
        deadline: Instant,
    ) -> Self {
        Self {
            correlator,
            intf,
            event,
            data,
            remaining,
            failed: SubscriberMask::new(),
            response: Outcome::Success,
            deadline,
        }
    }

    /// Clear `slot` from the remaining mask and fold in its outcome.
    ///
    /// The failed mask accumulates every failing slot; the response turns
    /// to failure on the first one.
    pub fn tally(&mut self, slot: usize, outcome: Outcome) -> Tally {
        if !self.remaining.remove(slot) {
            return Tally::NotOutstanding;
        }
        if !outcome.is_success() {
            self.failed.insert(slot);
            self.response = Outcome::Failure;
        }
        Tally::Recorded {
            done: self.remaining.is_empty(),
        }
    }

    pub fn completion(&self) -> Completion {
        Completion {
            correlator: self.correlator,
            event: self.event,
            response: self.response,
        }
    }
}
