//! IntfManagerHandle - client interface to the dispatch task

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::context::ManagerContext;
use super::messages::{CompletionCallback, EventCompletion, Request};
use super::metrics::{DispatchMetrics, TraceEntry};
use crate::correlator::Correlator;
use crate::domain::{
    CreateRequest, EventData, EventMask, InterfaceRecord, IntfId, IntfState, Outcome, PortEvent, Priority,
    StartupHook, Subscriber, SubscriberId,
};
use crate::error::{IntfError, IntfResult};
use crate::registry::Replay;

/// Everything a subscriber supplies when it registers
pub struct Registration {
    id: SubscriberId,
    callback: Arc<dyn Subscriber>,
    interest: EventMask,
    startup: Option<(Arc<dyn StartupHook>, Priority)>,
}

impl Registration {
    pub fn new(id: impl Into<SubscriberId>, callback: impl Subscriber + 'static, interest: EventMask) -> Self {
        Self {
            id: id.into(),
            callback: Arc::new(callback),
            interest,
            startup: None,
        }
    }

    /// Also run `hook` during startup, ordered by `priority`
    pub fn with_startup(mut self, hook: impl StartupHook + 'static, priority: Priority) -> Self {
        self.startup = Some((Arc::new(hook), priority));
        self
    }
}

/// Cloneable handle to a running interface manager
///
/// Registration, reporting and queries are synchronous; submitting events
/// waits only for room on the dispatch lane, never for the verdict unless a
/// `_wait` variant is used.
#[derive(Clone)]
pub struct IntfManagerHandle {
    ctx: Arc<ManagerContext>,
    external_tx: mpsc::Sender<Request>,
    internal_tx: mpsc::Sender<Request>,
}

impl IntfManagerHandle {
    pub(crate) fn new(
        ctx: Arc<ManagerContext>,
        external_tx: mpsc::Sender<Request>,
        internal_tx: mpsc::Sender<Request>,
    ) -> Self {
        Self {
            ctx,
            external_tx,
            internal_tx,
        }
    }

    /// Register a subscriber and, optionally, its startup hook
    pub fn register(&self, registration: Registration) -> IntfResult<()> {
        let Registration {
            id,
            callback,
            interest,
            startup,
        } = registration;
        debug!(subscriber = %id, %interest, "IntfManagerHandle::register: called");
        self.ctx.registry.register(id.clone(), callback, interest)?;

        if let Some((hook, priority)) = startup {
            match self.ctx.startup.add(id.clone(), priority, hook) {
                Replay::Nothing => {}
                Replay::All => {
                    info!(subscriber = %id, "Replaying pending startup");
                    self.queue_internal(Request::Startup { only: None })?;
                }
                Replay::Single => {
                    info!(subscriber = %id, "Running startup for late joiner");
                    self.queue_internal(Request::Startup { only: Some(id) })?;
                }
            }
        }
        Ok(())
    }

    /// Register a subscriber without a startup hook
    pub fn register_subscriber(
        &self,
        id: impl Into<SubscriberId>,
        callback: impl Subscriber + 'static,
        interest: EventMask,
    ) -> IntfResult<()> {
        self.register(Registration::new(id, callback, interest))
    }

    /// Replace a subscriber's event interest
    pub fn set_interest_mask(&self, id: &SubscriberId, interest: EventMask) -> IntfResult<()> {
        self.ctx.registry.set_interest(id, interest)
    }

    /// Ports are ready: run startup hooks now, or as soon as the first one
    /// registers
    pub fn start_ports(&self) -> IntfResult<()> {
        debug!("IntfManagerHandle::start_ports: called");
        if self.ctx.startup.request_start() {
            self.queue_internal(Request::Startup { only: None })
        } else {
            info!("No startup hooks registered yet, startup pending");
            Ok(())
        }
    }

    /// Queue `event` for `intf`. The returned correlator names the broadcast;
    /// `completion` receives the verdict after the state machine commits.
    pub async fn notify_event(
        &self,
        intf: IntfId,
        event: PortEvent,
        data: EventData,
        completion: Option<CompletionCallback>,
    ) -> IntfResult<Correlator> {
        debug!(%intf, %event, "IntfManagerHandle::notify_event: called");
        let correlator = self.ctx.pool.allocate()?;
        self.submit(
            correlator,
            Request::Notify {
                correlator,
                intf,
                event,
                data,
                completion,
            },
        )
        .await
    }

    /// Queue `event` and wait for its verdict.
    ///
    /// Must not be awaited from inside a subscriber callback or startup hook.
    pub async fn notify_event_wait(&self, intf: IntfId, event: PortEvent, data: EventData) -> IntfResult<()> {
        let (tx, rx) = oneshot::channel();
        self.notify_event(intf, event, data, Some(reply_to(tx))).await?;
        Self::await_verdict(rx).await
    }

    /// Add an interface and announce `Create`
    pub async fn create_interface(
        &self,
        request: CreateRequest,
        completion: Option<CompletionCallback>,
    ) -> IntfResult<Correlator> {
        debug!(intf = %request.id, name = %request.name, "IntfManagerHandle::create_interface: called");
        if self.ctx.table.contains(request.id) {
            return Err(IntfError::DuplicateInterface(request.id));
        }
        let correlator = self.ctx.pool.allocate()?;
        self.submit(
            correlator,
            Request::Create {
                correlator,
                request,
                completion,
            },
        )
        .await
    }

    pub async fn create_interface_wait(&self, request: CreateRequest) -> IntfResult<()> {
        let (tx, rx) = oneshot::channel();
        self.create_interface(request, Some(reply_to(tx))).await?;
        Self::await_verdict(rx).await
    }

    /// Queue `AdminEnable` or `AdminDisable`
    pub async fn set_admin_state(
        &self,
        intf: IntfId,
        enabled: bool,
        completion: Option<CompletionCallback>,
    ) -> IntfResult<Correlator> {
        let event = if enabled {
            PortEvent::AdminEnable
        } else {
            PortEvent::AdminDisable
        };
        self.notify_event(intf, event, EventData::None, completion).await
    }

    /// Diag-disable an interface; it is re-enabled by auto-recovery if
    /// configured
    pub async fn diag_disable(&self, intf: IntfId, completion: Option<CompletionCallback>) -> IntfResult<Correlator> {
        debug!(%intf, "IntfManagerHandle::diag_disable: called");
        let correlator = self.ctx.pool.allocate()?;
        self.submit(
            correlator,
            Request::DiagDisable {
                correlator,
                intf,
                completion,
            },
        )
        .await
    }

    /// Report a subscriber's outcome for `correlator`. Safe to call from any
    /// thread, including from inside the subscriber callback.
    pub fn report(&self, correlator: Correlator, subscriber: &SubscriberId, outcome: Outcome) -> IntfResult<()> {
        self.ctx.coordinator.report(correlator, subscriber, outcome)
    }

    pub fn get_state(&self, intf: IntfId) -> IntfState {
        self.ctx.table.get_state(intf)
    }

    pub fn is_link_up(&self, intf: IntfId) -> IntfResult<bool> {
        self.ctx.table.is_link_up(intf)
    }

    pub fn is_forwarding(&self, intf: IntfId) -> IntfResult<bool> {
        self.ctx.table.is_forwarding(intf)
    }

    pub fn is_authorized(&self, intf: IntfId) -> IntfResult<bool> {
        self.ctx.table.is_authorized(intf)
    }

    pub fn get_interface(&self, intf: IntfId) -> Option<InterfaceRecord> {
        self.ctx.table.get(intf)
    }

    pub fn list_interfaces(&self) -> Vec<InterfaceRecord> {
        self.ctx.table.list()
    }

    /// Subscribers interested in `event`, in invocation order
    pub fn interested_subscribers(&self, event: PortEvent) -> Vec<SubscriberId> {
        self.ctx.registry.interested_subscribers(event)
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.ctx.metrics_snapshot()
    }

    /// Recent trace entries, oldest first
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.ctx.trace.lock().snapshot()
    }

    pub fn correlators_in_use(&self) -> usize {
        self.ctx.pool.in_use()
    }

    /// Correlator of the broadcast in flight, if any
    pub fn open_transaction(&self) -> Option<Correlator> {
        self.ctx.coordinator.open_correlator()
    }

    /// Ask the dispatch task to stop after the request it is processing
    pub async fn shutdown(&self) -> IntfResult<()> {
        debug!("IntfManagerHandle::shutdown: called");
        self.external_tx
            .send(Request::Shutdown)
            .await
            .map_err(|_| IntfError::ChannelClosed)
    }

    async fn submit(&self, correlator: Correlator, req: Request) -> IntfResult<Correlator> {
        if self.external_tx.send(req).await.is_err() {
            let _ = self.ctx.pool.release(correlator);
            return Err(IntfError::ChannelClosed);
        }
        debug!(%correlator, "IntfManagerHandle::submit: queued");
        Ok(correlator)
    }

    fn queue_internal(&self, req: Request) -> IntfResult<()> {
        match self.internal_tx.try_send(req) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(req)) => {
                error!("Internal lane full, queueing in background");
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(req).await;
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IntfError::ChannelClosed),
        }
    }

    async fn await_verdict(rx: oneshot::Receiver<EventCompletion>) -> IntfResult<()> {
        rx.await.map_err(|_| IntfError::ChannelClosed)?.result
    }
}

fn reply_to(tx: oneshot::Sender<EventCompletion>) -> CompletionCallback {
    Box::new(move |completion| {
        let _ = tx.send(completion);
    })
}
