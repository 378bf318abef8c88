//! Public handler type exported by the crate.

use std::{thread, time::Duration};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::{
    encoder::RecordEncoder,
    handler::{Completion, DeliveryError, HandlerError, LogTransport},
    log_record::{Fields, LogRecord},
    rate_limited_warner::RateLimitedWarner,
};

use super::{
    config::DgramHandlerConfig,
    events::{DeliveryEvent, EventBus},
    worker::{DeliveryStats, DgramCommand, flush_queue, query_stats, spawn_worker},
};

/// Margin added to the shutdown drain budget while waiting for the worker.
const CLOSE_GRACE: Duration = Duration::from_secs(1);
/// Wait applied to flush and stats round trips.
const ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(1);

/// Handler shipping JSON-encoded records to a Unix datagram collector.
///
/// Records are encoded on the calling thread and handed to a worker thread
/// that owns the socket, the bounded retry queue and the reconnect timer.
/// The handler is `Send + Sync`; share it behind an `Arc` to log from many
/// threads.
pub struct UnixDgramHandler {
    tx: Option<Sender<DgramCommand>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    encoder: RecordEncoder,
    bus: EventBus,
    warner: RateLimitedWarner,
    close_timeout: Duration,
}

impl UnixDgramHandler {
    /// Construct a handler targeting `path` with default configuration.
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self::with_config(DgramHandlerConfig::new(path))
    }

    /// Construct the handler from a configuration object.
    pub fn with_config(config: DgramHandlerConfig) -> Self {
        let encoder = config.encoder();
        let warner = RateLimitedWarner::new(config.warn_interval);
        let close_timeout = drain_budget(&config) + CLOSE_GRACE;
        let bus = EventBus::new();
        let (tx, handle) = spawn_worker(config, bus.clone());
        Self {
            tx: Some(tx),
            handle: Mutex::new(Some(handle)),
            encoder,
            bus,
            warner,
            close_timeout,
        }
    }

    /// Log `message` at `level`, reporting the outcome to `completion`.
    ///
    /// An unknown level is reported before anything is queued. Every other
    /// outcome is reported from the worker thread.
    pub fn send(
        &self,
        level: &str,
        message: &str,
        fields: Fields,
        completion: impl FnOnce(Result<(), DeliveryError>) + Send + 'static,
    ) {
        self.dispatch(
            LogRecord::with_fields(level, message, fields),
            Box::new(completion),
        );
    }

    /// Fire-and-forget dispatch of `record`.
    pub fn handle(&self, record: LogRecord) -> Result<(), HandlerError> {
        let Some(tx) = self.sender() else {
            self.record_closed_drop();
            return Err(HandlerError::Closed);
        };
        let payload = self
            .encoder
            .encode(&record)
            .map_err(|err| HandlerError::Rejected(err.to_string()))?;
        tx.send(DgramCommand::Record {
            payload,
            completion: Box::new(|_| {}),
        })
        .map_err(|_| HandlerError::Closed)
    }

    /// Receive `logged`, `error` and `closed` notifications.
    pub fn subscribe(&self) -> Receiver<DeliveryEvent> {
        self.bus.subscribe()
    }

    /// Snapshot of the delivery pipeline, or `None` once closed.
    pub fn stats(&self) -> Option<DeliveryStats> {
        query_stats(self.tx.as_ref()?, ROUND_TRIP_TIMEOUT)
    }

    /// Trigger a queue flush and wait for the worker to acknowledge it.
    pub fn flush(&self) -> bool {
        <Self as LogTransport>::flush(self)
    }

    /// Drain the queue (bounded) and wait for the worker to exit.
    pub fn close(&mut self) {
        self.request_shutdown();
        self.join_worker();
    }

    fn dispatch(&self, record: LogRecord, completion: Completion) {
        let payload = match self.encoder.encode(&record) {
            Ok(payload) => payload,
            Err(err) => {
                completion(Err(err.into()));
                return;
            }
        };
        let Some(tx) = self.sender() else {
            self.record_closed_drop();
            completion(Err(DeliveryError::Closed));
            return;
        };
        if let Err(err) = tx.send(DgramCommand::Record {
            payload,
            completion,
        }) {
            if let DgramCommand::Record { completion, .. } = err.into_inner() {
                completion(Err(DeliveryError::Closed));
            }
        }
    }

    fn sender(&self) -> Option<&Sender<DgramCommand>> {
        self.tx.as_ref()
    }

    fn record_closed_drop(&self) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            log::warn!("UnixDgramHandler dropped {count} records after shutdown");
        });
    }

    fn request_shutdown(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(DgramCommand::Close(ack_tx)).is_err() {
            return;
        }
        match ack_rx.recv_timeout(self.close_timeout) {
            Ok(true) => {}
            Ok(false) => log::warn!("UnixDgramHandler closed before the queue drained"),
            Err(_) => log::warn!("UnixDgramHandler worker did not acknowledge close"),
        }
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            log::warn!("UnixDgramHandler: worker thread panicked");
        }
    }
}

fn drain_budget(config: &DgramHandlerConfig) -> Duration {
    (1..config.shutdown.max_attempts).fold(Duration::ZERO, |total, n| {
        total.saturating_add(config.shutdown.poll_step.saturating_mul(n))
    })
}

impl LogTransport for UnixDgramHandler {
    fn log(&self, record: LogRecord, completion: Completion) {
        self.dispatch(record, completion);
    }

    fn flush(&self) -> bool {
        let Some(tx) = self.sender() else {
            return false;
        };
        self.warner.flush(|count| {
            log::warn!("UnixDgramHandler dropped {count} records in the last interval");
        });
        flush_queue(tx, ROUND_TRIP_TIMEOUT)
    }

    fn close(&mut self) {
        UnixDgramHandler::close(self);
    }
}

impl Drop for UnixDgramHandler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for UnixDgramHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixDgramHandler")
            .field("open", &self.tx.is_some())
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}
