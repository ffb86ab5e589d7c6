//! Dispatch metrics and the event trace

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::correlator::Correlator;
use crate::domain::{IntfId, PortEvent, Priority};

/// Counters kept by the dispatch task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatchMetrics {
    /// Events taken off a lane
    pub events_received: u64,
    /// Transactions opened
    pub broadcasts: u64,
    /// Events with no interested subscriber
    pub short_circuited: u64,
    /// Events that ended in an error other than a timeout
    pub failures: u64,
    pub timeouts: u64,
    pub protocol_violations: u64,
    pub precondition_anomalies: u64,
    pub follow_ons: u64,
    /// Follow-ons that could not be queued
    pub follow_ons_dropped: u64,
    pub startup_hooks_run: u64,
    pub timer_ticks: u64,
    /// Live interfaces at snapshot time
    pub interfaces: usize,
    /// Correlators issued at snapshot time
    pub correlators_in_use: usize,
}

/// Where an event was when the trace entry was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceStage {
    Received,
    Committed,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub correlator: Correlator,
    pub intf: IntfId,
    pub event: PortEvent,
    pub lane: Priority,
    pub stage: TraceStage,
    pub verdict: Option<String>,
}

/// Bounded ring of recent trace entries
#[derive(Debug)]
pub(crate) struct EventTrace {
    depth: usize,
    entries: VecDeque<TraceEntry>,
}

impl EventTrace {
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            entries: VecDeque::with_capacity(depth.min(1024)),
        }
    }

    pub fn push(&mut self, entry: TraceEntry) {
        if self.depth == 0 {
            return;
        }
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<TraceEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u32) -> TraceEntry {
        TraceEntry {
            at: Utc::now(),
            correlator: Correlator::new(n),
            intf: IntfId(1),
            event: PortEvent::LinkUp,
            lane: Priority::Normal,
            stage: TraceStage::Received,
            verdict: None,
        }
    }

    #[test]
    fn test_trace_keeps_most_recent() {
        let mut trace = EventTrace::new(2);
        for n in 1..=3 {
            trace.push(entry(n));
        }
        let kept: Vec<u32> = trace.snapshot().iter().map(|e| e.correlator.value()).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn test_zero_depth_trace_is_disabled() {
        let mut trace = EventTrace::new(0);
        trace.push(entry(1));
        assert!(trace.snapshot().is_empty());
    }

    #[test]
    fn test_metrics_serialize_kebab() {
        let json = serde_json::to_value(DispatchMetrics::default()).unwrap();
        assert_eq!(json["events-received"], 0);
        assert_eq!(json["precondition-anomalies"], 0);
    }
}
