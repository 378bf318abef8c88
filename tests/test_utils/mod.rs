pub mod collector;

pub use collector::{Collector, SocketDir, socket_dir};
