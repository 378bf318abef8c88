//! Rate-limited warnings for records evicted from a full queue.

mod test_utils;

use std::time::{Duration, Instant};

use logtest::Logger;
use rstest::rstest;
use serial_test::serial;
use test_utils::{SocketDir, socket_dir};
use unix_dgram_log::{HandlerBuilderTrait, LogRecord, UnixDgramHandlerBuilder};

fn find_warning(logger: &mut Logger, needle: &str, timeout: Duration) -> Option<String> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        while let Some(record) = logger.pop() {
            if record.level() == log::Level::Warn && record.args().contains(needle) {
                return Some(record.args().to_owned());
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    None
}

#[rstest]
#[serial]
fn full_queue_evicts_oldest_and_warns(socket_dir: SocketDir) {
    let mut logger = Logger::start();
    let mut handler = UnixDgramHandlerBuilder::new()
        .with_path(socket_dir.path())
        .with_queue_capacity(2)
        .with_shutdown_poll_step_ms(1)
        .build_inner()
        .expect("valid builder");

    for n in 0..5 {
        handler
            .handle(LogRecord::new("info", &format!("r{n}")))
            .expect("record accepted");
    }
    let stats = handler.stats().expect("worker running");
    assert_eq!(stats.queued, 2, "queue never exceeds its bound");

    let warning = find_warning(&mut logger, "evicted", Duration::from_secs(2))
        .expect("eviction warning logged");
    assert!(warning.starts_with("UnixDgramHandler queue full"));

    handler.close();
    assert!(
        find_warning(&mut logger, "undelivered", Duration::from_secs(2)).is_some(),
        "close reports what it could not drain"
    );
}
