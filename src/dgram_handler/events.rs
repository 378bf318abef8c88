//! Observability notifications raised by the datagram handler.

use std::{io, sync::Arc};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use super::transport::ErrorCause;

/// Notification delivered to subscribers.
#[derive(Clone, Debug)]
pub enum DeliveryEvent {
    /// One send attempt finished; `delivered` is false when the payload went
    /// back to the queue.
    Logged { delivered: bool },
    /// A transport failure observed outside any single call.
    Error {
        cause: ErrorCause,
        error: Arc<io::Error>,
    },
    /// Shutdown completed; `had_endpoint` reports whether an endpoint was
    /// released.
    Closed { had_endpoint: bool },
}

/// Fan-out of [`DeliveryEvent`]s to any number of subscribers.
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<DeliveryEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Events raised before this call are not
    /// replayed.
    pub fn subscribe(&self) -> Receiver<DeliveryEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, pruning dropped ones.
    pub fn emit(&self, event: DeliveryEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
