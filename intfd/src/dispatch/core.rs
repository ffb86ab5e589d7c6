//! The dispatch task

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use super::context::ManagerContext;
use super::handle::IntfManagerHandle;
use super::messages::{CompletionCallback, EventCompletion, Request};
use super::metrics::{TraceEntry, TraceStage};
use crate::config::Config;
use crate::correlator::Correlator;
use crate::domain::{EventData, IntfId, PortEvent, Priority, StartupDone, StartupPhase, SubscriberId};
use crate::error::IntfError;
use crate::state::Step;

/// Owns the dispatch lanes. Build it with its first handle, then `run` it.
///
/// The manager keeps only the receiving end of the external lane, so the
/// loop ends once every handle is gone.
pub struct IntfManager {
    ctx: Arc<ManagerContext>,
    external_rx: mpsc::Receiver<Request>,
    internal_tx: mpsc::Sender<Request>,
    internal_rx: mpsc::Receiver<Request>,
}

impl IntfManager {
    /// Build a manager and the handle that feeds it
    pub fn new(config: Config) -> (Self, IntfManagerHandle) {
        debug!("IntfManager::new: called");
        let (external_tx, external_rx) = mpsc::channel(config.coordinator.channel_buffer.max(1));
        let (internal_tx, internal_rx) = mpsc::channel(config.coordinator.internal_channel_buffer.max(1));
        let ctx = Arc::new(ManagerContext::new(config));
        let handle = IntfManagerHandle::new(Arc::clone(&ctx), external_tx, internal_tx.clone());
        let manager = Self {
            ctx,
            external_rx,
            internal_tx,
            internal_rx,
        };
        (manager, handle)
    }

    /// Spawn the dispatch task on the current runtime and return a handle
    pub fn spawn(config: Config) -> (IntfManagerHandle, tokio::task::JoinHandle<()>) {
        let (manager, handle) = Self::new(config);
        let task = tokio::spawn(manager.run());
        (handle, task)
    }

    /// Run the dispatch loop until shutdown is requested or every handle
    /// has been dropped
    pub async fn run(mut self) {
        let mut ticker = interval(self.ctx.config.coordinator.timer_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!("Interface manager started");

        loop {
            tokio::select! {
                biased;

                Some(req) = self.internal_rx.recv() => {
                    self.dispatch(req, Priority::High).await;
                }

                req = self.external_rx.recv() => match req {
                    Some(Request::Shutdown) => {
                        info!("Shutdown requested");
                        break;
                    }
                    Some(req) => self.dispatch(req, Priority::Normal).await,
                    None => {
                        info!("All handles dropped");
                        break;
                    }
                },

                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.drain();
        info!("Interface manager stopped");
    }

    /// Answer requests that will never run and release their correlators
    fn drain(&mut self) {
        self.internal_rx.close();
        self.external_rx.close();
        let mut dropped = 0usize;
        while let Ok(req) = self.internal_rx.try_recv().or_else(|_| self.external_rx.try_recv()) {
            match req {
                Request::Notify {
                    correlator,
                    intf,
                    event,
                    completion,
                    ..
                } => self.abandon(correlator, intf, event, completion),
                Request::Create {
                    correlator,
                    request,
                    completion,
                } => self.abandon(correlator, request.id, PortEvent::Create, completion),
                Request::DiagDisable {
                    correlator,
                    intf,
                    completion,
                } => self.abandon(correlator, intf, PortEvent::AdminDisable, completion),
                Request::Startup { .. } | Request::Shutdown => {}
            }
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Dropped queued requests at shutdown");
        }
    }

    fn abandon(&self, correlator: Correlator, intf: IntfId, event: PortEvent, completion: Option<CompletionCallback>) {
        debug!(%correlator, %intf, %event, "IntfManager::abandon: called");
        self.release(correlator);
        if let Some(callback) = completion {
            callback(EventCompletion {
                correlator,
                intf,
                event,
                result: Err(IntfError::ChannelClosed),
            });
        }
    }

    async fn dispatch(&self, req: Request, lane: Priority) {
        debug!(?req, %lane, "IntfManager::dispatch: called");
        match req {
            Request::Notify {
                correlator,
                intf,
                event,
                data,
                completion,
            } => {
                self.process_event(correlator, intf, event, data, completion, lane).await;
            }

            Request::Create {
                correlator,
                request,
                completion,
            } => {
                let intf = request.id;
                let admin_default = self.ctx.config.defaults.admin_enabled;
                match self.ctx.machine.add_interface(&request, admin_default) {
                    Ok(()) => {
                        self.process_event(correlator, intf, PortEvent::Create, EventData::None, completion, lane)
                            .await;
                    }
                    Err(e) => {
                        warn!(%intf, error = %e, "Cannot create interface");
                        self.refuse(correlator, intf, PortEvent::Create, lane, e, completion);
                    }
                }
            }

            Request::DiagDisable {
                correlator,
                intf,
                completion,
            } => match self.ctx.machine.mark_diag_disabled(intf) {
                Ok(()) => {
                    self.process_event(correlator, intf, PortEvent::AdminDisable, EventData::None, completion, lane)
                        .await;
                }
                Err(e) => self.refuse(correlator, intf, PortEvent::AdminDisable, lane, e, completion),
            },

            Request::Startup { only } => self.run_startup(only).await,

            Request::Shutdown => {
                debug!("IntfManager::dispatch: shutdown on internal lane ignored");
            }
        }
    }

    async fn process_event(
        &self,
        correlator: Correlator,
        intf: IntfId,
        event: PortEvent,
        data: EventData,
        completion: Option<CompletionCallback>,
        lane: Priority,
    ) {
        self.ctx.metrics.lock().events_received += 1;
        self.trace(correlator, intf, event, lane, TraceStage::Received, None);

        let step = self.ctx.machine.handle(correlator, intf, event, data).await;
        for next in &step.follow_ons {
            self.queue_follow_on(next.intf, next.event);
        }
        self.release(correlator);
        self.account(&step);

        let stage = match (&step.result, &step.broadcast) {
            (Ok(()), _) => TraceStage::Committed,
            (Err(_), None) => TraceStage::Rejected,
            (Err(_), Some(_)) => TraceStage::Failed,
        };
        let verdict = step.result.as_ref().err().map(ToString::to_string);
        self.trace(correlator, intf, event, lane, stage, verdict);

        if let Some(callback) = completion {
            callback(EventCompletion {
                correlator,
                intf,
                event,
                result: step.result,
            });
        }
    }

    /// Answer a request that never reached the state machine
    fn refuse(
        &self,
        correlator: Correlator,
        intf: IntfId,
        event: PortEvent,
        lane: Priority,
        error: IntfError,
        completion: Option<CompletionCallback>,
    ) {
        self.release(correlator);
        self.ctx.metrics.lock().failures += 1;
        self.trace(correlator, intf, event, lane, TraceStage::Rejected, Some(error.to_string()));
        if let Some(callback) = completion {
            callback(EventCompletion {
                correlator,
                intf,
                event,
                result: Err(error),
            });
        }
    }

    fn account(&self, step: &Step) {
        let mut metrics = self.ctx.metrics.lock();
        if step.anomaly {
            metrics.precondition_anomalies += 1;
        }
        match &step.broadcast {
            Some(Ok(b)) if b.short_circuited() => metrics.short_circuited += 1,
            Some(_) => metrics.broadcasts += 1,
            None => {}
        }
        match &step.result {
            Ok(()) => {}
            Err(IntfError::Timeout { .. }) => metrics.timeouts += 1,
            Err(_) => metrics.failures += 1,
        }
    }

    fn queue_follow_on(&self, intf: IntfId, event: PortEvent) {
        let correlator = match self.ctx.pool.allocate() {
            Ok(c) => c,
            Err(e) => {
                error!(%intf, %event, error = %e, "Cannot queue follow-on event");
                self.ctx.metrics.lock().follow_ons_dropped += 1;
                return;
            }
        };

        let req = Request::Notify {
            correlator,
            intf,
            event,
            data: EventData::None,
            completion: None,
        };
        match self.internal_tx.try_send(req) {
            Ok(()) => {
                debug!(%correlator, %intf, %event, "IntfManager::queue_follow_on: queued");
                self.ctx.metrics.lock().follow_ons += 1;
            }
            Err(e) => {
                error!(%intf, %event, error = %e, "Internal lane full, follow-on dropped");
                self.release(correlator);
                self.ctx.metrics.lock().follow_ons_dropped += 1;
            }
        }
    }

    async fn run_startup(&self, only: Option<SubscriberId>) {
        let hooks: Vec<_> = match &only {
            Some(id) => self.ctx.startup.get(id).into_iter().collect(),
            None => self.ctx.startup.ordered(),
        };
        let limit = self.ctx.config.coordinator.startup_timeout();

        for phase in StartupPhase::ORDER {
            info!(%phase, hooks = hooks.len(), "Running startup phase");
            for entry in &hooks {
                debug!(subscriber = %entry.id, %phase, priority = %entry.priority, "IntfManager::run_startup: invoking");
                let (done, rx) = StartupDone::channel();
                entry.hook.start(phase, done);
                if timeout(limit, rx).await.is_err() {
                    warn!(subscriber = %entry.id, %phase, "Startup hook did not finish in time");
                }
                self.ctx.metrics.lock().startup_hooks_run += 1;
            }
        }
    }

    fn on_tick(&self) {
        self.ctx.metrics.lock().timer_ticks += 1;

        let Some(delay) = self.ctx.config.recovery.auto_recovery_delay() else {
            return;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(delay) else {
            return;
        };
        for intf in self.ctx.table.diag_disabled_before(cutoff) {
            info!(%intf, after_secs = delay.num_seconds(), "Auto-recovering diag-disabled interface");
            self.queue_follow_on(intf, PortEvent::AdminEnable);
        }
    }

    fn release(&self, correlator: Correlator) {
        if let Err(e) = self.ctx.pool.release(correlator) {
            warn!(%correlator, error = %e, "Failed to release correlator");
        }
    }

    fn trace(
        &self,
        correlator: Correlator,
        intf: IntfId,
        event: PortEvent,
        lane: Priority,
        stage: TraceStage,
        verdict: Option<String>,
    ) {
        self.ctx.trace.lock().push(TraceEntry {
            at: Utc::now(),
            correlator,
            intf,
            event,
            lane,
            stage,
            verdict,
        });
    }
}
