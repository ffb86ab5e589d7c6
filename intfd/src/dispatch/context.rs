//! State shared by the dispatch task and every handle

use std::sync::Arc;

use parking_lot::Mutex;

use super::metrics::{DispatchMetrics, EventTrace};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::correlator::CorrelatorPool;
use crate::registry::{StartupRegistry, SubscriberRegistry};
use crate::state::{InterfaceTable, StateMachine};

/// One per manager, built at start and held by reference everywhere
pub(crate) struct ManagerContext {
    pub config: Config,
    pub registry: Arc<SubscriberRegistry>,
    pub startup: StartupRegistry,
    pub pool: Arc<CorrelatorPool>,
    pub coordinator: Arc<Coordinator>,
    pub table: Arc<InterfaceTable>,
    pub machine: StateMachine,
    pub metrics: Mutex<DispatchMetrics>,
    pub trace: Mutex<EventTrace>,
}

impl ManagerContext {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let pool = Arc::new(CorrelatorPool::new(config.coordinator.correlator_pool_size));
        let coordinator = Arc::new(Coordinator::new(
            config.coordinator.clone(),
            Arc::clone(&registry),
            Arc::clone(&pool),
        ));
        let table = Arc::new(InterfaceTable::new());
        let machine = StateMachine::new(Arc::clone(&table), Arc::clone(&coordinator));
        let trace = EventTrace::new(config.coordinator.trace_depth);

        Self {
            config,
            registry,
            startup: StartupRegistry::new(),
            pool,
            coordinator,
            table,
            machine,
            metrics: Mutex::new(DispatchMetrics::default()),
            trace: Mutex::new(trace),
        }
    }

    /// Metrics with the live gauges filled in
    pub fn metrics_snapshot(&self) -> DispatchMetrics {
        let mut metrics = self.metrics.lock().clone();
        metrics.protocol_violations = self.coordinator.protocol_violations();
        metrics.interfaces = self.table.len();
        metrics.correlators_in_use = self.pool.in_use();
        metrics
    }
}
