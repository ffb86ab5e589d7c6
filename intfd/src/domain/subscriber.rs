//! Subscriber identity, callback contract and startup hooks

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::event::{EventData, PortEvent};
use super::intf::IntfId;
use crate::correlator::Correlator;

/// Registry key for a subscriber
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a subscriber is told about one event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventNotice {
    pub intf: IntfId,
    pub event: PortEvent,
    pub correlator: Correlator,
    pub data: EventData,
}

/// Callback invoked for every event a subscriber is interested in.
///
/// The callback runs on the dispatch task and must not block. It returns
/// whether the event was accepted; an accepted event must later be answered
/// with exactly one `report` for `notice.correlator`. Reporting from inside
/// the callback is allowed.
pub trait Subscriber: Send + Sync {
    fn notify(&self, notice: &EventNotice) -> bool;
}

impl<F> Subscriber for F
where
    F: Fn(&EventNotice) -> bool + Send + Sync,
{
    fn notify(&self, notice: &EventNotice) -> bool {
        self(notice)
    }
}

/// Result a subscriber reports for one correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<bool> for Outcome {
    fn from(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Failure }
    }
}

/// Startup phase announced to startup hooks, `Create` before `Activate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartupPhase {
    Create,
    Activate,
}

impl StartupPhase {
    pub const ORDER: [StartupPhase; 2] = [StartupPhase::Create, StartupPhase::Activate];
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Activate => write!(f, "activate"),
        }
    }
}

/// Completion token handed to a startup hook.
///
/// The dispatch loop waits until the token is completed or dropped.
#[derive(Debug)]
pub struct StartupDone {
    tx: oneshot::Sender<()>,
}

impl StartupDone {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Signal that the hook has finished this phase
    pub fn complete(self) {
        let _ = self.tx.send(());
    }
}

/// Hook run once per startup phase
pub trait StartupHook: Send + Sync {
    fn start(&self, phase: StartupPhase, done: StartupDone);
}

impl<F> StartupHook for F
where
    F: Fn(StartupPhase, StartupDone) + Send + Sync,
{
    fn start(&self, phase: StartupPhase, done: StartupDone) {
        self(phase, done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_subscriber() {
        let subscriber = |notice: &EventNotice| notice.event == PortEvent::LinkUp;
        let notice = EventNotice {
            intf: IntfId(1),
            event: PortEvent::LinkUp,
            correlator: Correlator::new(5),
            data: EventData::None,
        };
        assert!(subscriber.notify(&notice));
    }

    #[test]
    fn test_outcome_from_bool() {
        assert_eq!(Outcome::from(true), Outcome::Success);
        assert!(!Outcome::from(false).is_success());
    }

    #[tokio::test]
    async fn test_startup_done_drop_counts_as_done() {
        let (done, rx) = StartupDone::channel();
        drop(done);
        assert!(rx.await.is_err());

        let (done, rx) = StartupDone::channel();
        done.complete();
        assert!(rx.await.is_ok());
    }
}
