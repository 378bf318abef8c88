//! Unix datagram logging handler implementation.
//!
//! This module defines `UnixDgramHandler`, a handler that encodes
//! [`LogRecord`](crate::log_record::LogRecord) values as JSON lines and
//! forwards them to a collector listening on a Unix datagram socket. The
//! worker thread owns the socket, parks records in a bounded queue while the
//! collector is unreachable or congested, and reconnects with exponential
//! backoff after the socket closes.

mod backoff;
mod config;
mod connection;
mod events;
mod handler;
mod queue;
mod transport;
mod worker;


pub use config::{
    BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_QUEUE_CAPACITY, DEFAULT_SEND_TIMEOUT,
    DEFAULT_SHUTDOWN_ATTEMPTS, DEFAULT_SHUTDOWN_POLL_STEP, DEFAULT_WRITABLE_POLL_INTERVAL,
    DgramHandlerConfig, ShutdownPolicy,
};
pub use events::DeliveryEvent;
pub use handler::UnixDgramHandler;
pub use queue::DeliveryQueue;
pub use transport::{
    AttemptId, DatagramTransport, ErrorCause, EventSink, Generation, Readiness, TransportEvent,
    TransportFactory, UnixDgramFactory, UnixDgramTransport, is_ready,
};
pub use worker::DeliveryStats;
