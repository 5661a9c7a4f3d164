//! Host subscription interface
//!
//! The host owns the event feed; the bridge only holds cancel handles.
//! Every call degrades to `None` when no live host is present so the bridge
//! can run standalone.

use crate::events::{Combatant, HostEvent, HostEventKind};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Channel the host delivers events into
pub type EventSender = mpsc::UnboundedSender<HostEvent>;

/// Pending reply to a roster request
pub type RosterReceiver = oneshot::Receiver<Vec<Combatant>>;

/// The external automation host
pub trait Host: Send + Sync {
    /// Subscribe `sender` to one event kind; `None` if the host is unavailable
    fn subscribe(&self, kind: HostEventKind, sender: EventSender) -> Option<Subscription>;

    /// Ask for the current combatant roster; `None` if the host is unavailable
    ///
    /// The reply may already be waiting in the receiver or arrive later.
    /// A dropped sender means the host gave up on the request.
    fn request_roster(&self) -> Option<RosterReceiver>;
}

/// Cancel handle for one subscription
///
/// `cancel` is idempotent and dropping the handle cancels it.
pub struct Subscription {
    kind: HostEventKind,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(kind: HostEventKind, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn kind(&self) -> HostEventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Release the subscription with the host
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            log::trace!("Unsubscribing from {}", self.kind);
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Stand-in for a missing host: every call is a no-op
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl Host for NullHost {
    fn subscribe(&self, _kind: HostEventKind, _sender: EventSender) -> Option<Subscription> {
        None
    }

    fn request_roster(&self) -> Option<RosterReceiver> {
        None
    }
}
