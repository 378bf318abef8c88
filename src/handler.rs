use std::{io, sync::Arc};

use thiserror::Error;

use crate::{encoder::EncodeError, level::UnknownLevel, log_record::LogRecord};

/// Outcome reported to the caller of a single log call.
#[derive(Clone, Debug, Error)]
pub enum DeliveryError {
    /// The level is not one of the eight syslog severities.
    #[error(transparent)]
    UnknownLevel(#[from] UnknownLevel),
    /// The record could not be serialised.
    #[error("failed to encode record: {0}")]
    Encode(String),
    /// The transport exists but cannot send yet; the record was queued.
    #[error("transport is not ready; record queued")]
    NotReady,
    /// Establishing the transport failed; the record was queued.
    #[error("failed to connect to collector: {0}")]
    Connect(Arc<io::Error>),
    /// The handler has shut down; the record was dropped.
    #[error("handler is closed")]
    Closed,
}

impl From<EncodeError> for DeliveryError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::UnknownLevel(level) => Self::UnknownLevel(level),
            EncodeError::Serialise(err) => Self::Encode(err.to_string()),
        }
    }
}

/// Errors returned synchronously by fire-and-forget dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler has been closed.
    #[error("handler is closed")]
    Closed,
    /// The record was rejected before it reached the delivery queue.
    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Completion callback invoked exactly once per log call.
pub type Completion = Box<dyn FnOnce(Result<(), DeliveryError>) + Send + 'static>;

/// Capability set exposed by a log transport.
///
/// Implementations must accept calls from several threads at once; any
/// serialisation of state happens inside the transport.
pub trait LogTransport: Send + Sync {
    /// Submit `record`; `completion` reports the outcome for this call.
    fn log(&self, record: LogRecord, completion: Completion);

    /// Ask the transport to drain buffered records. Returns `true` when the
    /// request was acknowledged.
    fn flush(&self) -> bool;

    /// Drain what can be drained and release the transport.
    fn close(&mut self);
}
