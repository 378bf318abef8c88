//! Worker thread driving datagram I/O.
//!
//! The worker is the single owner of the delivery queue, the in-flight
//! attempts and the [`ConnectionManager`]. It multiplexes caller commands,
//! transport events and its own timers (reconnect, send timeouts, writable
//! polling, shutdown polling) so every state change happens on one thread.

use std::{
    collections::BTreeMap,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, bounded, never, select, unbounded};
use log::{debug, warn};

use crate::{
    encoder::PendingPayload,
    handler::{Completion, DeliveryError},
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    config::{DgramHandlerConfig, ShutdownPolicy},
    connection::{ConnectionManager, Effect, Ensure, HandleState, NotReady},
    events::{DeliveryEvent, EventBus},
    queue::DeliveryQueue,
    transport::{AttemptId, Generation, TransportEvent},
};

/// Commands processed by the worker thread.
pub enum DgramCommand {
    Record {
        payload: PendingPayload,
        completion: Completion,
    },
    Flush(Sender<()>),
    Stats(Sender<DeliveryStats>),
    Close(Sender<bool>),
}

impl std::fmt::Debug for DgramCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DgramCommand::Record { payload, .. } => {
                f.debug_struct("Record").field("payload", payload).finish()
            }
            DgramCommand::Flush(_) => f.write_str("Flush"),
            DgramCommand::Stats(_) => f.write_str("Stats"),
            DgramCommand::Close(_) => f.write_str("Close"),
        }
    }
}

/// Point-in-time view of the delivery pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryStats {
    pub queued: usize,
    pub in_flight: usize,
    pub retries: u32,
    pub connected: bool,
    pub congested: bool,
    /// Number of queue flushes performed so far.
    pub flushes: u64,
}

/// A log call waiting for the connection manager.
pub(crate) struct Waiter {
    payload: PendingPayload,
    completion: Completion,
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waiter")
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Log,
    Flush,
}

#[derive(Debug)]
struct Attempt {
    payload: PendingPayload,
    origin: Origin,
    deadline: Instant,
}

#[derive(Debug)]
struct Shutdown {
    attempt: u32,
    next_poll: Instant,
    acks: Vec<Sender<bool>>,
}

impl From<NotReady> for DeliveryError {
    fn from(reason: NotReady) -> Self {
        match reason {
            NotReady::Pending => DeliveryError::NotReady,
            NotReady::Connect(err) => DeliveryError::Connect(err),
        }
    }
}

pub fn spawn_worker(
    config: DgramHandlerConfig,
    bus: EventBus,
) -> (Sender<DgramCommand>, thread::JoinHandle<()>) {
    let (tx, rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let worker = Worker::new(config, bus, event_tx);
    let handle = thread::spawn(move || worker.run(rx, event_rx));
    (tx, handle)
}

pub(crate) struct Worker {
    manager: ConnectionManager<Waiter>,
    queue: DeliveryQueue,
    attempts: BTreeMap<AttemptId, Attempt>,
    next_attempt: u64,
    send_timeout: Duration,
    writable_poll_interval: Duration,
    next_writable_poll: Option<Instant>,
    shutdown_policy: ShutdownPolicy,
    shutdown: Option<Shutdown>,
    finished: bool,
    flushes: u64,
    bus: EventBus,
    warner: RateLimitedWarner,
}

impl Worker {
    pub(crate) fn new(
        config: DgramHandlerConfig,
        bus: EventBus,
        events: Sender<(Generation, TransportEvent)>,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(config.path, config.factory, events, config.backoff),
            queue: DeliveryQueue::new(config.queue_capacity),
            attempts: BTreeMap::new(),
            next_attempt: 0,
            send_timeout: config.send_timeout,
            writable_poll_interval: config.writable_poll_interval,
            next_writable_poll: None,
            shutdown_policy: config.shutdown,
            shutdown: None,
            finished: false,
            flushes: 0,
            bus,
            warner: RateLimitedWarner::new(config.warn_interval),
        }
    }

    fn run(mut self, rx: Receiver<DgramCommand>, events: Receiver<(Generation, TransportEvent)>) {
        let mut commands = Some(rx);
        while !self.finished {
            self.tick(Instant::now());
            if self.finished {
                break;
            }
            let timer = match self.next_deadline() {
                Some(deadline) => crossbeam_channel::at(deadline),
                None => never(),
            };
            let command_rx = commands.clone().unwrap_or_else(never);
            select! {
                recv(events) -> msg => {
                    if let Ok((generation, event)) = msg {
                        self.handle_event(generation, event);
                    }
                }
                recv(command_rx) -> msg => match msg {
                    Ok(command) => self.handle_command(command),
                    Err(_) => {
                        commands = None;
                        self.begin_shutdown(None);
                    }
                },
                recv(timer) -> _ => {}
            }
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn handle_command(&mut self, command: DgramCommand) {
        match command {
            DgramCommand::Record {
                payload,
                completion,
            } => self.send(Waiter {
                payload,
                completion,
            }),
            DgramCommand::Flush(ack) => {
                self.flush();
                let _ = ack.send(());
            }
            DgramCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            DgramCommand::Close(ack) => self.begin_shutdown(Some(ack)),
        }
    }

    pub(crate) fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            queued: self.queue.len(),
            in_flight: self.attempts.len(),
            retries: self.manager.retries(),
            connected: matches!(self.manager.state(), HandleState::Connected { .. }),
            congested: self.manager.is_congested(),
            flushes: self.flushes,
        }
    }

    fn send(&mut self, waiter: Waiter) {
        if self.manager.state() == HandleState::ShutDown {
            self.warner.record_drop();
            (waiter.completion)(Err(DeliveryError::Closed));
            return;
        }
        match self.manager.ensure_connected(waiter) {
            Ensure::Parked => {}
            Ensure::Resolved(waiter, result) => self.on_ready(waiter, result),
        }
    }

    fn on_ready(&mut self, waiter: Waiter, result: Result<(), NotReady>) {
        let Waiter {
            payload,
            completion,
        } = waiter;
        match result {
            Err(reason) => {
                self.enqueue(payload);
                completion(Err(reason.into()));
            }
            Ok(()) if self.manager.is_congested() => {
                self.enqueue(payload);
                completion(Ok(()));
            }
            Ok(()) => {
                self.begin_attempt(payload, Origin::Log);
                completion(Ok(()));
            }
        }
    }

    fn enqueue(&mut self, payload: PendingPayload) {
        if self.queue.push(payload).is_some() {
            self.record_eviction();
        }
    }

    fn record_eviction(&self) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("UnixDgramHandler queue full; evicted {count} oldest records");
        });
    }

    fn begin_attempt(&mut self, payload: PendingPayload, origin: Origin) {
        let id = AttemptId(self.next_attempt);
        self.next_attempt += 1;
        let deadline = Instant::now() + self.send_timeout;
        self.attempts.insert(
            id,
            Attempt {
                payload: payload.clone(),
                origin,
                deadline,
            },
        );
        if !self.manager.transmit(id, &payload) {
            self.resolve_failed(id);
        }
    }

    fn resolve_sent(&mut self, id: AttemptId) {
        let Some(attempt) = self.attempts.remove(&id) else {
            return;
        };
        self.bus.emit(DeliveryEvent::Logged { delivered: true });
        if attempt.origin == Origin::Flush {
            self.flush();
        }
    }

    fn resolve_failed(&mut self, id: AttemptId) {
        let Some(attempt) = self.attempts.remove(&id) else {
            return;
        };
        self.requeue(attempt);
        self.bus.emit(DeliveryEvent::Logged { delivered: false });
    }

    fn requeue(&mut self, attempt: Attempt) {
        match attempt.origin {
            Origin::Log => self.enqueue(attempt.payload),
            Origin::Flush => {
                if self.queue.push_front(attempt.payload).is_some() {
                    self.record_eviction();
                }
            }
        }
    }

    /// Resolve every outstanding attempt as failed. Flush attempts return to
    /// the head in their original order; log attempts go to the tail.
    fn fail_outstanding(&mut self) {
        let attempts = std::mem::take(&mut self.attempts);
        let (flushed, logged): (Vec<_>, Vec<_>) = attempts
            .into_values()
            .partition(|attempt| attempt.origin == Origin::Flush);
        let resolved = flushed.len() + logged.len();
        for attempt in flushed.into_iter().rev().chain(logged) {
            self.requeue(attempt);
        }
        for _ in 0..resolved {
            self.bus.emit(DeliveryEvent::Logged { delivered: false });
        }
    }

    /// Hand the oldest queued payload to the transport.
    ///
    /// At most one flush attempt is outstanding; each successful one
    /// continues the drain.
    pub(crate) fn flush(&mut self) {
        self.flushes += 1;
        if self.queue.is_empty()
            || self.manager.is_congested()
            || !matches!(self.manager.state(), HandleState::Connected { .. })
            || self.attempts.values().any(|a| a.origin == Origin::Flush)
        {
            return;
        }
        if let Some(payload) = self.queue.pop() {
            self.begin_attempt(payload, Origin::Flush);
        }
    }

    pub(crate) fn handle_event(&mut self, generation: Generation, event: TransportEvent) {
        if !self.manager.is_current(generation) {
            debug!("UnixDgramHandler ignoring {event:?} from stale endpoint {generation}");
            return;
        }
        match event {
            TransportEvent::Connected => {
                let effects = self.manager.on_connect();
                self.schedule_writable_poll(Instant::now());
                self.apply(effects);
            }
            TransportEvent::Writable => {
                self.next_writable_poll = None;
                let effects = self.manager.on_writable();
                self.apply(effects);
            }
            TransportEvent::Congestion => {
                self.manager.on_congestion();
                self.schedule_writable_poll(Instant::now());
                self.fail_outstanding();
            }
            TransportEvent::Sent(id) => self.resolve_sent(id),
            TransportEvent::Error { cause, error } => {
                self.fail_outstanding();
                let effects = self.manager.on_error(cause, error);
                self.apply(effects);
            }
            TransportEvent::Closed => {
                self.next_writable_poll = None;
                let effects = self.manager.on_close(Instant::now());
                self.apply(effects);
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect<Waiter>>) {
        for effect in effects {
            match effect {
                Effect::Ready(waiter, result) => self.on_ready(waiter, result),
                Effect::Flush => self.flush(),
                Effect::RaiseError { cause, error } => {
                    self.bus.emit(DeliveryEvent::Error { cause, error });
                }
                Effect::ReconnectScheduled { .. } => {}
            }
        }
    }

    fn schedule_writable_poll(&mut self, now: Instant) {
        if self.manager.is_congested() && self.next_writable_poll.is_none() {
            self.next_writable_poll = Some(now + self.writable_poll_interval);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let attempt = self.attempts.values().map(|a| a.deadline).min();
        let shutdown = self.shutdown.as_ref().map(|s| s.next_poll);
        [
            self.manager.reconnect_deadline(),
            attempt,
            self.next_writable_poll,
            shutdown,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run every timer whose deadline has passed.
    pub(crate) fn tick(&mut self, now: Instant) {
        self.manager.reconnect_if_due(now);

        let expired: Vec<AttemptId> = self
            .attempts
            .iter()
            .filter(|(_, attempt)| attempt.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            debug!("UnixDgramHandler send attempt {id:?} timed out");
            self.resolve_failed(id);
        }

        if let Some(at) = self.next_writable_poll
            && at <= now
        {
            self.next_writable_poll = None;
            if self.manager.is_congested() {
                self.manager.poll_writable();
                self.schedule_writable_poll(now);
            }
        }

        if self.shutdown.as_ref().is_some_and(|s| s.next_poll <= now) {
            self.poll_shutdown(now);
        }
    }

    fn begin_shutdown(&mut self, ack: Option<Sender<bool>>) {
        match self.shutdown.as_mut() {
            Some(state) => state.acks.extend(ack),
            None => {
                self.shutdown = Some(Shutdown {
                    attempt: 0,
                    next_poll: Instant::now(),
                    acks: ack.into_iter().collect(),
                });
            }
        }
    }

    fn poll_shutdown(&mut self, now: Instant) {
        let drained = self.queue.is_empty() && self.attempts.is_empty();
        let max_attempts = self.shutdown_policy.max_attempts.max(1);
        let poll_step = self.shutdown_policy.poll_step;
        let Some(state) = self.shutdown.as_mut() else {
            return;
        };
        let attempt = state.attempt + 1;
        if drained || attempt >= max_attempts {
            self.finish_shutdown(drained);
            return;
        }
        state.attempt = attempt;
        state.next_poll = now + poll_step.saturating_mul(attempt);
        self.flush();
    }

    fn finish_shutdown(&mut self, drained: bool) {
        let (had_endpoint, waiter) = self.manager.shutdown();
        let mut dropped = self.queue.clear() + self.attempts.len();
        self.attempts.clear();
        if let Some(waiter) = waiter {
            dropped += 1;
            (waiter.completion)(Err(DeliveryError::Closed));
        }
        if dropped > 0 {
            warn!("UnixDgramHandler closed with {dropped} undelivered records");
        }
        self.warner.flush(|count| {
            warn!("UnixDgramHandler dropped {count} records in the last interval");
        });
        self.bus.emit(DeliveryEvent::Closed { had_endpoint });
        if let Some(state) = self.shutdown.take() {
            for ack in state.acks {
                let _ = ack.send(drained);
            }
        }
        self.finished = true;
    }
}

/// Sends a flush command to the worker and waits for acknowledgment.
pub fn flush_queue(tx: &Sender<DgramCommand>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let (ack_tx, ack_rx) = bounded(1);
    if tx
        .send_timeout(DgramCommand::Flush(ack_tx), timeout)
        .is_err()
    {
        return false;
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    ack_rx.recv_timeout(remaining).is_ok()
}

/// Ask the worker for a snapshot of its state.
pub fn query_stats(tx: &Sender<DgramCommand>, timeout: Duration) -> Option<DeliveryStats> {
    let (reply_tx, reply_rx) = bounded(1);
    tx.send(DgramCommand::Stats(reply_tx)).ok()?;
    reply_rx.recv_timeout(timeout).ok()
}
