//! Syslog severity levels accepted by the datagram handler.

use std::fmt;
use std::str::FromStr;

/// The eight syslog severities, ordered from least to most severe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyslogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Crit,
    Alert,
    Emerg,
}

impl SyslogLevel {
    /// All levels in ascending severity.
    pub const ALL: [SyslogLevel; 8] = [
        SyslogLevel::Debug,
        SyslogLevel::Info,
        SyslogLevel::Notice,
        SyslogLevel::Warning,
        SyslogLevel::Error,
        SyslogLevel::Crit,
        SyslogLevel::Alert,
        SyslogLevel::Emerg,
    ];

    /// Lowercase name used by callers.
    pub fn as_str(self) -> &'static str {
        match self {
            SyslogLevel::Debug => "debug",
            SyslogLevel::Info => "info",
            SyslogLevel::Notice => "notice",
            SyslogLevel::Warning => "warning",
            SyslogLevel::Error => "error",
            SyslogLevel::Crit => "crit",
            SyslogLevel::Alert => "alert",
            SyslogLevel::Emerg => "emerg",
        }
    }
}

/// Renders the uppercase form written into encoded records.
impl fmt::Display for SyslogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyslogLevel::Debug => "DEBUG",
            SyslogLevel::Info => "INFO",
            SyslogLevel::Notice => "NOTICE",
            SyslogLevel::Warning => "WARNING",
            SyslogLevel::Error => "ERROR",
            SyslogLevel::Crit => "CRIT",
            SyslogLevel::Alert => "ALERT",
            SyslogLevel::Emerg => "EMERG",
        };
        f.write_str(s)
    }
}

/// Error returned when a level name is not one of the syslog severities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot log unknown syslog level: {}", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

/// Parsing is exact: only the lowercase names are accepted.
impl FromStr for SyslogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownLevel(s.to_owned()))
    }
}

impl From<SyslogLevel> for log::Level {
    fn from(level: SyslogLevel) -> Self {
        match level {
            SyslogLevel::Debug => log::Level::Debug,
            SyslogLevel::Info | SyslogLevel::Notice => log::Level::Info,
            SyslogLevel::Warning => log::Level::Warn,
            SyslogLevel::Error | SyslogLevel::Crit | SyslogLevel::Alert | SyslogLevel::Emerg => {
                log::Level::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("debug", SyslogLevel::Debug)]
    #[case("notice", SyslogLevel::Notice)]
    #[case("crit", SyslogLevel::Crit)]
    #[case("emerg", SyslogLevel::Emerg)]
    fn parses_lowercase_names(#[case] input: &str, #[case] expected: SyslogLevel) {
        assert_eq!(input.parse::<SyslogLevel>(), Ok(expected));
    }

    #[rstest]
    #[case("INFO")]
    #[case("warn")]
    #[case("critical")]
    #[case("")]
    fn rejects_other_names(#[case] input: &str) {
        let err = input.parse::<SyslogLevel>().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot log unknown syslog level: {input}")
        );
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        let mut sorted = SyslogLevel::ALL;
        sorted.sort();
        assert_eq!(sorted, SyslogLevel::ALL);
        assert!(SyslogLevel::Debug < SyslogLevel::Emerg);
    }

    #[test]
    fn display_is_uppercase() {
        assert_eq!(SyslogLevel::Warning.to_string(), "WARNING");
        assert_eq!(SyslogLevel::Emerg.to_string(), "EMERG");
    }
}
