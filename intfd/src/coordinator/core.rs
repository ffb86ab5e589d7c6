//! Coordinator: the single transaction slot, fan-out and tally

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::transaction::{Completion, Tally, Transaction};
use crate::correlator::{Correlator, CorrelatorPool};
use crate::domain::{EventData, EventNotice, IntfId, Outcome, PortEvent, SubscriberId};
use crate::error::{IntfError, IntfResult};
use crate::registry::{SubscriberMask, SubscriberRegistry};

/// Summary of a broadcast that reached a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    /// Number of subscribers invoked; zero means no transaction was opened
    pub notified: usize,
}

impl Broadcast {
    pub fn short_circuited(&self) -> bool {
        self.notified == 0
    }
}

/// Owns the single in-flight transaction.
///
/// `begin` holds the completion receiver for the whole transaction, so a
/// second `begin` waits until the first has released the slot. The slot
/// itself sits behind its own lock, which is never held while a subscriber
/// callback runs or while `begin` waits for completion.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<SubscriberRegistry>,
    pool: Arc<CorrelatorPool>,
    slot: Mutex<Option<Transaction>>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: AsyncMutex<mpsc::Receiver<Completion>>,
    protocol_violations: AtomicU64,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, registry: Arc<SubscriberRegistry>, pool: Arc<CorrelatorPool>) -> Self {
        debug!(?config, "Coordinator::new: called");
        let (completion_tx, completion_rx) = mpsc::channel(1);
        Self {
            config,
            registry,
            pool,
            slot: Mutex::new(None),
            completion_tx,
            completion_rx: AsyncMutex::new(completion_rx),
            protocol_violations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<CorrelatorPool> {
        &self.pool
    }

    /// Correlator of the open transaction, if any
    pub fn open_correlator(&self) -> Option<Correlator> {
        self.slot.lock().as_ref().map(|t| t.correlator)
    }

    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations.load(Ordering::Relaxed)
    }

    /// Run one broadcast under a freshly allocated correlator, releasing it
    /// before returning
    pub async fn begin(&self, intf: IntfId, event: PortEvent, data: EventData) -> IntfResult<Broadcast> {
        debug!(%intf, %event, "Coordinator::begin: called");
        let correlator = self.pool.allocate()?;
        let result = self.begin_with(correlator, intf, event, data).await;
        if let Err(e) = self.pool.release(correlator) {
            warn!(%correlator, error = %e, "Failed to release correlator");
        }
        result
    }

    /// Run one broadcast under `correlator`, which the caller owns.
    ///
    /// Returns once every interested subscriber has reported or the
    /// deadline has passed. The transaction slot is free again on return.
    pub async fn begin_with(
        &self,
        correlator: Correlator,
        intf: IntfId,
        event: PortEvent,
        data: EventData,
    ) -> IntfResult<Broadcast> {
        debug!(%correlator, %intf, %event, "Coordinator::begin_with: called");
        let interested = self.registry.interested(event);
        if interested.is_empty() {
            debug!(%correlator, %intf, %event, "No interested subscribers, nothing to wait for");
            return Ok(Broadcast { notified: 0 });
        }

        let mut completions = self.completion_rx.lock().await;
        // Leftover from a transaction that completed after its deadline
        while let Ok(stale) = completions.try_recv() {
            debug!(correlator = %stale.correlator, "Coordinator::begin_with: dropping stale completion");
        }

        {
            let mut slot = self.slot.lock();
            if let Some(open) = slot.as_ref() {
                error!(open = %open.correlator, %correlator, "Transaction slot still occupied, replacing");
            }
            let remaining: SubscriberMask = interested.iter().map(|s| s.slot).collect();
            let deadline = Instant::now() + self.config.event_timeout();
            *slot = Some(Transaction::open(correlator, intf, event, data.clone(), remaining, deadline));
        }

        let notice = EventNotice {
            intf,
            event,
            correlator,
            data,
        };
        for subscriber in &interested {
            debug!(%correlator, subscriber = %subscriber.id, %event, "Coordinator::begin_with: notifying");
            if !subscriber.callback.notify(&notice) {
                warn!(%correlator, %intf, %event, subscriber = %subscriber.id, "Subscriber rejected event");
                if let Err(reason) = self.tally(correlator, subscriber.slot, &subscriber.id, Outcome::Failure) {
                    debug!(%correlator, %reason, "Coordinator::begin_with: rejection not tallied");
                }
            }
        }

        loop {
            let Some(deadline) = self.deadline_of(correlator) else {
                break;
            };
            match timeout_at(deadline, completions.recv()).await {
                Ok(Some(done)) if done.correlator == correlator => {
                    debug!(%correlator, response = ?done.response, "Coordinator::begin_with: quorum reached");
                    break;
                }
                Ok(Some(stale)) => {
                    debug!(correlator = %stale.correlator, "Coordinator::begin_with: ignoring stale completion");
                }
                Ok(None) => {
                    error!(%correlator, "Completion channel closed");
                    self.slot.lock().take();
                    return Err(IntfError::ChannelClosed);
                }
                Err(_) => {
                    debug!(%correlator, "Coordinator::begin_with: deadline passed");
                    break;
                }
            }
        }

        let Some(txn) = self.slot.lock().take() else {
            error!(%correlator, "Transaction vanished from slot");
            return Err(IntfError::ProtocolViolation(format!(
                "transaction {} closed by someone else",
                correlator
            )));
        };
        drop(completions);

        self.verdict(txn, interested.len())
    }

    /// Deadline of the open transaction, if it is still `correlator`'s
    fn deadline_of(&self, correlator: Correlator) -> Option<Instant> {
        self.slot
            .lock()
            .as_ref()
            .filter(|txn| txn.correlator == correlator)
            .map(|txn| txn.deadline)
    }

    fn verdict(&self, txn: Transaction, notified: usize) -> IntfResult<Broadcast> {
        if !txn.remaining.is_empty() {
            let pending = self.ids(&txn.remaining);
            for id in &pending {
                error!(
                    correlator = %txn.correlator,
                    intf = %txn.intf,
                    event = %txn.event,
                    subscriber = %id,
                    "Subscriber did not respond before deadline"
                );
            }
            debug!(correlator = %txn.correlator, data = ?txn.data, "Coordinator::verdict: timed out");
            return Err(IntfError::Timeout { pending });
        }

        match txn.response {
            Outcome::Success => Ok(Broadcast { notified }),
            Outcome::Failure => Err(IntfError::SubscriberFailure {
                failed: self.ids(&txn.failed),
            }),
        }
    }

    fn ids(&self, mask: &SubscriberMask) -> Vec<SubscriberId> {
        mask.iter().filter_map(|slot| self.registry.id_at(slot)).collect()
    }

    /// Record `subscriber`'s outcome for `correlator`.
    ///
    /// A report for a correlator that is not open, or a second report from
    /// the same subscriber, is a protocol violation and changes nothing.
    pub fn report(&self, correlator: Correlator, subscriber: &SubscriberId, outcome: Outcome) -> IntfResult<()> {
        debug!(%correlator, %subscriber, ?outcome, "Coordinator::report: called");
        let slot = self
            .registry
            .slot_of(subscriber)
            .ok_or_else(|| IntfError::UnknownSubscriber(subscriber.clone()))?;

        match self.tally(correlator, slot, subscriber, outcome) {
            Ok(()) => Ok(()),
            Err(reason) => {
                self.protocol_violations.fetch_add(1, Ordering::Relaxed);
                warn!(%correlator, %subscriber, %reason, "Protocol violation on report");
                Err(IntfError::ProtocolViolation(reason))
            }
        }
    }

    fn tally(&self, correlator: Correlator, slot: usize, subscriber: &SubscriberId, outcome: Outcome) -> Result<(), String> {
        let mut guard = self.slot.lock();
        let txn = match guard.as_mut() {
            Some(txn) if txn.correlator == correlator => txn,
            Some(txn) => {
                return Err(format!(
                    "correlator {} does not match open transaction {}",
                    correlator, txn.correlator
                ));
            }
            None => return Err(format!("no transaction open for correlator {}", correlator)),
        };

        match txn.tally(slot, outcome) {
            Tally::NotOutstanding => Err(format!(
                "subscriber {} has no outstanding report for correlator {}",
                subscriber, correlator
            )),
            Tally::Recorded { done } => {
                if !outcome.is_success() {
                    error!(%correlator, intf = %txn.intf, event = %txn.event, %subscriber, "Subscriber failed event");
                }
                if done {
                    let completion = txn.completion();
                    if self.completion_tx.try_send(completion).is_err() {
                        debug!(%correlator, "Coordinator::tally: completion already queued");
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("open", &self.open_correlator())
            .finish()
    }
}

/// Log the verdict of a finished broadcast
pub(crate) fn log_verdict(correlator: Correlator, intf: IntfId, event: PortEvent, result: &IntfResult<Broadcast>) {
    match result {
        Ok(b) if b.short_circuited() => debug!(%correlator, %intf, %event, "Event had no subscribers"),
        Ok(b) => info!(%correlator, %intf, %event, notified = b.notified, "Event completed"),
        Err(e) => warn!(%correlator, %intf, %event, error = %e, "Event failed"),
    }
}
