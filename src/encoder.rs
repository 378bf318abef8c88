//! Record encoding for the datagram handler.
//!
//! [`RecordEncoder`] turns a [`LogRecord`] into a single JSON line, merging
//! a timestamp, the uppercase level and the producer's default fields, and
//! optionally prepending a prefix. The resulting [`PendingPayload`] is
//! immutable and cheap to clone, so it can sit in the delivery queue and be
//! handed to the transport repeatedly without copying.

use std::{fmt, io, ops::Deref, sync::Arc};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::{
    level::{SyslogLevel, UnknownLevel},
    log_record::{Fields, LogRecord},
};

/// One fully encoded record ready for transmission.
#[derive(Clone, PartialEq, Eq)]
pub struct PendingPayload(Arc<[u8]>);

impl PendingPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for PendingPayload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PendingPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<String> for PendingPayload {
    fn from(text: String) -> Self {
        Self(text.into_bytes().into())
    }
}

impl From<&str> for PendingPayload {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().into())
    }
}

impl fmt::Debug for PendingPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingPayload({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Text prepended to every encoded record.
#[derive(Clone)]
pub enum Prefix {
    /// Prepended verbatim.
    Static(String),
    /// Invoked once per record; its return value is prepended.
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Prefix {
    /// Build a dynamic prefix from a closure.
    pub fn dynamic(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    fn render(&self) -> String {
        match self {
            Prefix::Static(text) => text.clone(),
            Prefix::Dynamic(f) => f(),
        }
    }
}

impl From<&str> for Prefix {
    fn from(text: &str) -> Self {
        Self::Static(text.to_owned())
    }
}

impl From<String> for Prefix {
    fn from(text: String) -> Self {
        Self::Static(text)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Prefix::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Errors produced while encoding a record.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    UnknownLevel(#[from] UnknownLevel),
    #[error("failed to serialise record: {0}")]
    Serialise(#[from] io::Error),
}

/// Encoder shared between the handler and its callers.
#[derive(Clone, Debug, Default)]
pub struct RecordEncoder {
    producer: Fields,
    prefix: Option<Prefix>,
}

impl RecordEncoder {
    pub fn new(producer: Fields, prefix: Option<Prefix>) -> Self {
        Self { producer, prefix }
    }

    pub fn producer(&self) -> &Fields {
        &self.producer
    }

    /// Encode `record` stamped with the current time.
    pub fn encode(&self, record: &LogRecord) -> Result<PendingPayload, EncodeError> {
        self.encode_at(record, Utc::now())
    }

    /// Encode `record` stamped with `time`.
    pub fn encode_at(
        &self,
        record: &LogRecord,
        time: DateTime<Utc>,
    ) -> Result<PendingPayload, EncodeError> {
        let level: SyslogLevel = record.level.parse()?;
        let object = self.merge(record, level, time);
        let json = serde_json::to_string(&Value::Object(object)).map_err(io::Error::other)?;
        let line = match &self.prefix {
            Some(prefix) => {
                let mut line = prefix.render();
                line.push_str(&json);
                line
            }
            None => json,
        };
        Ok(PendingPayload::from(line))
    }

    fn merge(&self, record: &LogRecord, level: SyslogLevel, time: DateTime<Utc>) -> Fields {
        let mut object = Fields::new();
        object.insert(
            "time".into(),
            Value::String(time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert("level".into(), Value::String(level.to_string()));
        object.extend(self.producer.iter().map(|(k, v)| (k.clone(), v.clone())));

        if record.fields.is_empty() {
            object.insert("log".into(), Value::String(record.message.clone()));
        } else {
            object.extend(record.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        object
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap()
    }

    fn decode(payload: &PendingPayload) -> Value {
        serde_json::from_slice(payload).expect("payload is json")
    }

    #[rstest]
    fn encodes_message_under_log_key(time: DateTime<Utc>) {
        let encoder = RecordEncoder::default();
        let payload = encoder
            .encode_at(&LogRecord::new("info", "hello"), time)
            .expect("encode");
        assert_eq!(
            decode(&payload),
            json!({"time": "2024-05-17T08:30:00.000Z", "level": "INFO", "log": "hello"})
        );
    }

    #[rstest]
    fn producer_fields_are_merged(time: DateTime<Utc>) {
        let mut producer = Fields::new();
        producer.insert("service".into(), json!("billing"));
        producer.insert("level".into(), json!("ignored-by-nobody"));
        let encoder = RecordEncoder::new(producer, None);
        let payload = encoder
            .encode_at(&LogRecord::new("error", "boom"), time)
            .expect("encode");
        let value = decode(&payload);
        assert_eq!(value["service"], "billing");
        assert_eq!(value["level"], "ignored-by-nobody");
        assert_eq!(value["log"], "boom");
    }

    #[rstest]
    fn structured_fields_override_base(time: DateTime<Utc>) {
        let mut producer = Fields::new();
        producer.insert("host".into(), json!("a"));
        let encoder = RecordEncoder::new(producer, None);
        let record = LogRecord::new("notice", "ignored")
            .field("host", "b")
            .field("user_id", 42);
        let value = decode(&encoder.encode_at(&record, time).expect("encode"));
        assert_eq!(value["host"], "b");
        assert_eq!(value["user_id"], 42);
        assert_eq!(value["level"], "NOTICE");
        assert!(value.get("log").is_none());
    }

    #[rstest]
    fn static_prefix_is_prepended(time: DateTime<Utc>) {
        let encoder = RecordEncoder::new(Fields::new(), Some(Prefix::from("<14>app: ")));
        let payload = encoder
            .encode_at(&LogRecord::new("debug", "x"), time)
            .expect("encode");
        let text = std::str::from_utf8(&payload).unwrap();
        assert!(text.starts_with("<14>app: {"), "unexpected payload {text}");
    }

    #[rstest]
    fn dynamic_prefix_runs_once_per_record(time: DateTime<Utc>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let encoder = RecordEncoder::new(
            Fields::new(),
            Some(Prefix::dynamic(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                format!("#{n} ")
            })),
        );
        let first = encoder
            .encode_at(&LogRecord::new("info", "a"), time)
            .expect("encode");
        let second = encoder
            .encode_at(&LogRecord::new("info", "b"), time)
            .expect("encode");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(first.starts_with(b"#0 {"));
        assert!(second.starts_with(b"#1 {"));
    }

    #[rstest]
    fn unknown_level_is_rejected_before_prefix_runs(time: DateTime<Utc>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let encoder = RecordEncoder::new(
            Fields::new(),
            Some(Prefix::dynamic(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                String::new()
            })),
        );
        let err = encoder
            .encode_at(&LogRecord::new("verbose", "x"), time)
            .expect_err("level must be rejected");
        assert!(matches!(err, EncodeError::UnknownLevel(UnknownLevel(ref l)) if l == "verbose"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    fn payload_is_a_single_line(time: DateTime<Utc>) {
        let encoder = RecordEncoder::default();
        let payload = encoder
            .encode_at(&LogRecord::new("info", "multi\nline"), time)
            .expect("encode");
        assert!(!payload.contains(&b'\n'));
    }
}
