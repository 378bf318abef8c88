//! Transport primitives for the datagram handler.
//!
//! A transport endpoint performs I/O and reports what happened as
//! [`TransportEvent`]s on an [`EventSink`]; it never calls back into the
//! handler. Endpoints are produced by a [`TransportFactory`] so tests and
//! embedders can substitute their own.

use std::{
    fmt, io,
    os::unix::{io::AsRawFd, net::UnixDatagram},
    path::Path,
};

use crossbeam_channel::Sender;

/// Identifies one endpoint instance; bumped on every endpoint creation.
pub type Generation = u64;

/// Identifies one send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

/// Phase in which a transport error occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCause {
    Connect,
    Send,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorCause::Connect => "connect",
            ErrorCause::Send => "send",
        })
    }
}

/// Signals raised by a transport endpoint.
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Closed,
    Error { cause: ErrorCause, error: io::Error },
    /// The receiver cannot currently accept more data.
    Congestion,
    /// The receiver can accept data again.
    Writable,
    /// The payload of this attempt was handed to the receiver.
    Sent(AttemptId),
}

/// Readiness reported by an endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Connecting,
    Open,
    Closed,
}

/// An endpoint with no readiness state, or an open one, can send.
pub fn is_ready(readiness: Option<Readiness>) -> bool {
    matches!(readiness, None | Some(Readiness::Open))
}

/// Channel through which an endpoint reports events.
#[derive(Clone, Debug)]
pub struct EventSink {
    generation: Generation,
    tx: Sender<(Generation, TransportEvent)>,
}

impl EventSink {
    pub(crate) fn new(generation: Generation, tx: Sender<(Generation, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Report `event`. Events sent after the handler has gone are discarded.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.tx.send((self.generation, event));
    }
}

/// Connectionless endpoint to the collector.
pub trait DatagramTransport: Send {
    /// Begin connecting to `path`; resolves with `Connected` or a
    /// connect-class `Error`.
    fn connect(&mut self, path: &Path);

    /// Transmit `payload`; resolves with `Sent(attempt)`, `Congestion`, or a
    /// send-class `Error`.
    fn send(&mut self, attempt: AttemptId, payload: &[u8]);

    /// Explicit readiness, if the endpoint tracks one.
    fn readiness(&self) -> Option<Readiness> {
        None
    }

    /// Report `Writable` if the receiver can accept data again.
    fn poll_writable(&mut self) {}

    /// Release the endpoint and report `Closed`.
    fn close(&mut self);
}

/// Creates transport endpoints.
pub trait TransportFactory: Send + Sync {
    fn create_endpoint(&self, events: EventSink) -> Box<dyn DatagramTransport>;
}

/// Factory producing [`UnixDgramTransport`] endpoints.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixDgramFactory;

impl TransportFactory for UnixDgramFactory {
    fn create_endpoint(&self, events: EventSink) -> Box<dyn DatagramTransport> {
        Box::new(UnixDgramTransport::new(events))
    }
}

/// Non-blocking Unix datagram endpoint.
#[derive(Debug)]
pub struct UnixDgramTransport {
    socket: Option<UnixDatagram>,
    events: EventSink,
}

impl UnixDgramTransport {
    pub fn new(events: EventSink) -> Self {
        Self {
            socket: None,
            events,
        }
    }

    fn open(path: &Path) -> io::Result<UnixDatagram> {
        let socket = UnixDatagram::unbound()?;
        socket.set_nonblocking(true)?;
        socket.connect(path)?;
        Ok(socket)
    }
}

fn is_congestion(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::ENOBUFS)
}

fn socket_writable(socket: &UnixDatagram) -> io::Result<bool> {
    let mut fds = libc::pollfd {
        fd: socket.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    // SAFETY: `fds` is a valid pollfd for the duration of the call and the
    // descriptor stays open while `socket` is borrowed.
    let rc = unsafe { libc::poll(&mut fds, 1, 0) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc > 0 && fds.revents & libc::POLLOUT != 0)
}

impl DatagramTransport for UnixDgramTransport {
    fn connect(&mut self, path: &Path) {
        match Self::open(path) {
            Ok(socket) => {
                self.socket = Some(socket);
                self.events.emit(TransportEvent::Connected);
                self.poll_writable();
            }
            Err(error) => self.events.emit(TransportEvent::Error {
                cause: ErrorCause::Connect,
                error,
            }),
        }
    }

    fn send(&mut self, attempt: AttemptId, payload: &[u8]) {
        let Some(socket) = self.socket.as_ref() else {
            self.events.emit(TransportEvent::Error {
                cause: ErrorCause::Send,
                error: io::Error::new(io::ErrorKind::NotConnected, "socket is not connected"),
            });
            return;
        };
        match socket.send(payload) {
            Ok(_) => self.events.emit(TransportEvent::Sent(attempt)),
            Err(err) if is_congestion(&err) => self.events.emit(TransportEvent::Congestion),
            Err(error) => self.events.emit(TransportEvent::Error {
                cause: ErrorCause::Send,
                error,
            }),
        }
    }

    fn readiness(&self) -> Option<Readiness> {
        Some(if self.socket.is_some() {
            Readiness::Open
        } else {
            Readiness::Closed
        })
    }

    fn poll_writable(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        match socket_writable(socket) {
            Ok(true) => self.events.emit(TransportEvent::Writable),
            Ok(false) => {}
            Err(err) => log::debug!("UnixDgramHandler writability poll failed: {err}"),
        }
    }

    fn close(&mut self) {
        self.socket = None;
        self.events.emit(TransportEvent::Closed);
    }
}
