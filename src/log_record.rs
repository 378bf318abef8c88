//! Log record representation handed to the datagram handler.
//!
//! A `LogRecord` carries the raw level name as supplied by the caller. The
//! name is only validated when the record is encoded, so an unknown level is
//! reported through the completion path rather than at construction time.

use std::fmt;

use serde_json::{Map, Value};

/// Ordered mapping of structured fields attached to a record.
pub type Fields = Map<String, Value>;

#[derive(Clone, Debug, Default)]
pub struct LogRecord {
    /// The level name as supplied by the caller (e.g. "info").
    pub level: String,
    /// The log message content.
    pub message: String,
    /// Structured fields that override the base record when non-empty.
    pub fields: Fields,
}

impl LogRecord {
    /// Construct a record without structured fields.
    pub fn new(level: &str, message: &str) -> Self {
        Self {
            level: level.to_owned(),
            message: message.to_owned(),
            fields: Fields::new(),
        }
    }

    /// Construct a record carrying structured fields.
    pub fn with_fields(level: &str, message: &str, fields: Fields) -> Self {
        Self {
            level: level.to_owned(),
            message: message.to_owned(),
            fields,
        }
    }

    /// Attach a single field, replacing any previous value for `key`.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.level, self.message)
    }
}
