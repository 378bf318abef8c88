//! Connection lifecycle for the datagram transport.
//!
//! [`ConnectionManager`] owns the single transport endpoint. It creates the
//! endpoint lazily, reacts to transport events, and reconnects with
//! exponential backoff after the endpoint closes. The manager never blocks:
//! a caller that triggers a connect is parked as the pending waiter and is
//! handed back through [`Effect::Ready`] once the attempt resolves.

use std::{
    io,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use log::{debug, warn};

use super::{
    backoff::BackoffState,
    config::BackoffPolicy,
    transport::{
        AttemptId, DatagramTransport, ErrorCause, EventSink, Generation, Readiness,
        TransportEvent, TransportFactory, is_ready,
    },
};

/// Stand-in deadline when the backoff delay overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Why a waiter could not be given a ready endpoint.
#[derive(Clone, Debug)]
pub enum NotReady {
    /// An endpoint exists but cannot send yet.
    Pending,
    /// The connect attempt failed.
    Connect(Arc<io::Error>),
}

/// Lifecycle of the endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Absent,
    Connecting,
    Connected { congested: bool },
    ClosedPendingReconnect { at: Instant },
    ShutDown,
}

/// Follow-up work the owner must perform after a manager transition.
#[derive(Debug)]
pub enum Effect<W> {
    /// Resolve a parked waiter.
    Ready(W, Result<(), NotReady>),
    /// Drain the delivery queue.
    Flush,
    /// Raise an asynchronous error notification.
    RaiseError {
        cause: ErrorCause,
        error: Arc<io::Error>,
    },
    /// A reconnect was scheduled; `retries` is the counter after the bump.
    ReconnectScheduled { delay: Duration, retries: u32 },
}

/// Outcome of [`ConnectionManager::ensure_connected`].
#[derive(Debug)]
pub enum Ensure<W> {
    /// Resolved immediately; the waiter is handed back.
    Resolved(W, Result<(), NotReady>),
    /// A connect attempt started; the waiter resolves via [`Effect::Ready`].
    Parked,
}

pub struct ConnectionManager<W> {
    path: PathBuf,
    factory: Arc<dyn TransportFactory>,
    events: Sender<(Generation, TransportEvent)>,
    generation: Generation,
    endpoint: Option<Box<dyn DatagramTransport>>,
    state: HandleState,
    backoff: BackoffState,
    waiter: Option<W>,
}

impl<W> ConnectionManager<W> {
    pub fn new(
        path: PathBuf,
        factory: Arc<dyn TransportFactory>,
        events: Sender<(Generation, TransportEvent)>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            path,
            factory,
            events,
            generation: 0,
            endpoint: None,
            state: HandleState::Absent,
            backoff: BackoffState::new(policy),
            waiter: None,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Consecutive reconnect cycles since the last successful connect.
    pub fn retries(&self) -> u32 {
        self.backoff.retries()
    }

    pub fn is_congested(&self) -> bool {
        matches!(self.state, HandleState::Connected { congested: true })
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Whether `generation` belongs to the endpoint currently tracked.
    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation && self.state != HandleState::ShutDown
    }

    /// Readiness of the existing handle, derived from the lifecycle state and
    /// the endpoint's own report.
    pub fn readiness(&self) -> Option<Readiness> {
        match self.state {
            HandleState::Absent | HandleState::ShutDown => Some(Readiness::Closed),
            HandleState::Connecting => Some(Readiness::Connecting),
            HandleState::Connected { .. } => self
                .endpoint
                .as_ref()
                .map_or(Some(Readiness::Closed), |endpoint| endpoint.readiness()),
            HandleState::ClosedPendingReconnect { .. } => Some(Readiness::Closed),
        }
    }

    /// Get a ready handle, or learn why there is none.
    ///
    /// With no endpoint at all, one is created and `waiter` is parked until
    /// the connect attempt resolves.
    pub fn ensure_connected(&mut self, waiter: W) -> Ensure<W> {
        match self.state {
            HandleState::Absent => {
                self.waiter = Some(waiter);
                self.open_endpoint();
                Ensure::Parked
            }
            HandleState::ShutDown => Ensure::Resolved(waiter, Err(NotReady::Pending)),
            _ if is_ready(self.readiness()) => Ensure::Resolved(waiter, Ok(())),
            _ => Ensure::Resolved(waiter, Err(NotReady::Pending)),
        }
    }

    fn open_endpoint(&mut self) {
        self.generation += 1;
        let sink = EventSink::new(self.generation, self.events.clone());
        let mut endpoint = self.factory.create_endpoint(sink);
        self.state = HandleState::Connecting;
        debug!(
            "UnixDgramHandler connecting to {} (generation {})",
            self.path.display(),
            self.generation
        );
        endpoint.connect(&self.path);
        self.endpoint = Some(endpoint);
    }

    fn discard_endpoint(&mut self) {
        if let Some(mut endpoint) = self.endpoint.take() {
            endpoint.close();
        }
    }

    /// Hand `payload` to the endpoint. Returns `false` without an endpoint.
    pub fn transmit(&mut self, attempt: AttemptId, payload: &[u8]) -> bool {
        match self.endpoint.as_mut() {
            Some(endpoint) => {
                endpoint.send(attempt, payload);
                true
            }
            None => false,
        }
    }

    /// Ask a congested endpoint whether it is writable again.
    pub fn poll_writable(&mut self) {
        if self.is_congested()
            && let Some(endpoint) = self.endpoint.as_mut()
        {
            endpoint.poll_writable();
        }
    }

    pub fn on_connect(&mut self) -> Vec<Effect<W>> {
        self.backoff.reset();
        // Assume congestion until the endpoint reports otherwise.
        self.state = HandleState::Connected { congested: true };
        debug!("UnixDgramHandler connected to {}", self.path.display());
        let mut effects = vec![Effect::Flush];
        if let Some(waiter) = self.waiter.take() {
            effects.push(Effect::Ready(waiter, Ok(())));
        }
        effects
    }

    pub fn on_congestion(&mut self) {
        if let HandleState::Connected { congested } = &mut self.state {
            *congested = true;
        }
    }

    pub fn on_writable(&mut self) -> Vec<Effect<W>> {
        match &mut self.state {
            HandleState::Connected { congested } => {
                *congested = false;
                vec![Effect::Flush]
            }
            _ => Vec::new(),
        }
    }

    /// Tear down after a transport error; the pending waiter (if any) sees
    /// the error and an asynchronous notification is raised either way.
    pub fn on_error(&mut self, cause: ErrorCause, error: io::Error) -> Vec<Effect<W>> {
        let error = Arc::new(error);
        warn!(
            "UnixDgramHandler {cause} error on {}: {error}",
            self.path.display()
        );
        self.discard_endpoint();
        let mut effects = Vec::new();
        if let Some(waiter) = self.waiter.take() {
            effects.push(Effect::Ready(
                waiter,
                Err(NotReady::Connect(Arc::clone(&error))),
            ));
        }
        effects.push(Effect::RaiseError { cause, error });
        effects
    }

    /// Schedule a reconnect after the endpoint closed.
    pub fn on_close(&mut self, now: Instant) -> Vec<Effect<W>> {
        if matches!(self.state, HandleState::ClosedPendingReconnect { .. }) {
            return Vec::new();
        }
        self.discard_endpoint();
        let delay = self.backoff.next_delay();
        let at = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.state = HandleState::ClosedPendingReconnect { at };
        debug!(
            "UnixDgramHandler reconnecting to {} in {delay:?}",
            self.path.display()
        );
        let mut effects = Vec::new();
        if let Some(waiter) = self.waiter.take() {
            effects.push(Effect::Ready(waiter, Err(NotReady::Pending)));
        }
        effects.push(Effect::ReconnectScheduled {
            delay,
            retries: self.backoff.retries(),
        });
        effects
    }

    /// When the next reconnect is due, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        match self.state {
            HandleState::ClosedPendingReconnect { at } => Some(at),
            _ => None,
        }
    }

    /// Start the scheduled reconnect if its deadline has passed.
    pub fn reconnect_if_due(&mut self, now: Instant) {
        if let HandleState::ClosedPendingReconnect { at } = self.state
            && now >= at
        {
            self.open_endpoint();
        }
    }

    /// Release the endpoint for good. Returns whether one was present, and
    /// the parked waiter if a connect was still outstanding.
    pub fn shutdown(&mut self) -> (bool, Option<W>) {
        let had_endpoint = self.endpoint.is_some();
        self.state = HandleState::ShutDown;
        self.discard_endpoint();
        (had_endpoint, self.waiter.take())
    }
}
