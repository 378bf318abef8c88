//! A datagram collector bound inside a temporary directory.
//!
//! Tests point a handler at [`SocketDir::path`] and bind the collector
//! either up front or later, to exercise the reconnect path.

use std::{
    os::unix::net::UnixDatagram,
    path::PathBuf,
    time::{Duration, Instant},
};

use rstest::fixture;
use serde_json::Value;
use tempfile::TempDir;

/// Temporary directory holding the collector socket path.
pub struct SocketDir {
    dir: TempDir,
}

impl SocketDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create socket dir"),
        }
    }

    /// Path handlers should target.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("collector.sock")
    }

    /// Bind a collector at [`Self::path`].
    pub fn bind(&self) -> Collector {
        let socket = UnixDatagram::bind(self.path()).expect("bind collector");
        Collector { socket }
    }
}

#[fixture]
pub fn socket_dir() -> SocketDir {
    SocketDir::new()
}

/// Receiving end of the handler's datagrams.
pub struct Collector {
    socket: UnixDatagram,
}

impl Collector {
    /// Receive one datagram, waiting at most `timeout`.
    pub fn recv_raw(&self, timeout: Duration) -> Option<String> {
        self.socket
            .set_read_timeout(Some(timeout))
            .expect("set read timeout");
        let mut buf = vec![0u8; 64 * 1024];
        let len = self.socket.recv(&mut buf).ok()?;
        Some(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    /// Receive one datagram and decode it as JSON.
    pub fn recv_json(&self, timeout: Duration) -> Option<Value> {
        let raw = self.recv_raw(timeout)?;
        Some(serde_json::from_str(&raw).expect("datagram is json"))
    }

    /// Keep receiving until `expected` datagrams arrived or `timeout` elapsed.
    pub fn recv_many(&self, expected: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        let mut received = Vec::new();
        while received.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.recv_raw(remaining.min(Duration::from_millis(100))) {
                Some(raw) => received.push(raw),
                None => continue,
            }
        }
        received
    }
}
