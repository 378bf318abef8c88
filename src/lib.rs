//! Structured log delivery over Unix datagram sockets.
//!
//! [`UnixDgramHandler`] encodes records as single-line JSON and ships them to
//! a collector bound on a local datagram socket. A worker thread owns the
//! socket, keeps undeliverable records in a bounded queue, reconnects with
//! exponential backoff and drains what it can on shutdown.

pub mod dgram_handler;
pub mod encoder;
pub mod file_config;
pub mod handler;
pub mod handlers;
pub mod level;
pub mod log_record;
pub mod rate_limited_warner;

pub use dgram_handler::{
    BackoffPolicy, DeliveryEvent, DeliveryQueue, DeliveryStats, DgramHandlerConfig, ErrorCause,
    ShutdownPolicy, TransportEvent, TransportFactory, UnixDgramFactory, UnixDgramHandler,
};
pub use encoder::{EncodeError, PendingPayload, Prefix, RecordEncoder};
pub use file_config::{ConfigFileError, load_config, parse_config};
pub use handler::{Completion, DeliveryError, HandlerError, LogTransport};
pub use handlers::{HandlerBuildError, HandlerBuilderTrait, UnixDgramHandlerBuilder};
pub use level::{SyslogLevel, UnknownLevel};
pub use log_record::{Fields, LogRecord};
