//! Configuration structures consumed by the datagram handler lifecycle.
//!
//! `UnixDgramHandlerBuilder` and the INI loader construct these values
//! before passing them to [`UnixDgramHandler`](super::UnixDgramHandler) for
//! runtime use.

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    encoder::{Prefix, RecordEncoder},
    log_record::Fields,
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
};

use super::transport::{TransportFactory, UnixDgramFactory};

/// Default bound on the number of payloads awaiting (re)transmission.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default unresolved-send deadline after which an attempt counts as failed.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);
/// Default interval between writability probes while congested.
pub const DEFAULT_WRITABLE_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Default base delay for reconnect backoff.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Default step between shutdown drain polls.
pub const DEFAULT_SHUTDOWN_POLL_STEP: Duration = Duration::from_millis(200);
/// Default number of shutdown drain polls.
pub const DEFAULT_SHUTDOWN_ATTEMPTS: u32 = 6;

/// Configuration object describing how to construct a
/// [`UnixDgramHandler`](super::UnixDgramHandler).
#[derive(Clone)]
pub struct DgramHandlerConfig {
    /// Filesystem path of the collector's datagram socket.
    pub path: PathBuf,
    /// Default fields merged into every record.
    pub producer: Fields,
    /// Text prepended to every serialised record.
    pub prefix: Option<Prefix>,
    pub queue_capacity: usize,
    pub send_timeout: Duration,
    pub writable_poll_interval: Duration,
    pub backoff: BackoffPolicy,
    pub shutdown: ShutdownPolicy,
    pub warn_interval: Duration,
    /// Creates transport endpoints; replaced in tests.
    pub factory: Arc<dyn TransportFactory>,
}

impl DgramHandlerConfig {
    /// Configuration with defaults targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            producer: Fields::new(),
            prefix: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            writable_poll_interval: DEFAULT_WRITABLE_POLL_INTERVAL,
            backoff: BackoffPolicy::default(),
            shutdown: ShutdownPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            factory: Arc::new(UnixDgramFactory),
        }
    }

    /// Override the transport factory.
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub(crate) fn encoder(&self) -> RecordEncoder {
        RecordEncoder::new(self.producer.clone(), self.prefix.clone())
    }
}

impl std::fmt::Debug for DgramHandlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DgramHandlerConfig")
            .field("path", &self.path)
            .field("producer", &self.producer)
            .field("prefix", &self.prefix)
            .field("queue_capacity", &self.queue_capacity)
            .field("send_timeout", &self.send_timeout)
            .field("writable_poll_interval", &self.writable_poll_interval)
            .field("backoff", &self.backoff)
            .field("shutdown", &self.shutdown)
            .field("warn_interval", &self.warn_interval)
            .finish_non_exhaustive()
    }
}

/// Exponential backoff policy for reconnection attempts.
///
/// The delay before the k-th consecutive reconnect is `base * 2^k`, limited
/// to `cap` when one is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            cap: None,
        }
    }
}

/// Bounded drain performed by `close()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownPolicy {
    /// Poll `n` (0-based) runs `poll_step * n` after poll `n - 1`.
    pub poll_step: Duration,
    pub max_attempts: u32,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        Self {
            poll_step: DEFAULT_SHUTDOWN_POLL_STEP,
            max_attempts: DEFAULT_SHUTDOWN_ATTEMPTS,
        }
    }
}
