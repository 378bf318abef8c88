//! INI configuration for the datagram handler.
//!
//! Handler options live in a `[unix_dgram]` section; a `[producer]` section
//! supplies default fields merged into every record. Parsing uses the
//! `rust-ini` crate and produces a [`UnixDgramHandlerBuilder`], so the usual
//! builder validation still runs when the handler is built.
//!
//! ```ini
//! [unix_dgram]
//! path = /run/collector.sock
//! prefix = <14>
//! queue_capacity = 5000
//! backoff_base_ms = 500
//!
//! [producer]
//! service = billing
//! ```

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
};

use ini::{Ini, Properties};
use serde_json::Value;
use thiserror::Error;

use crate::handlers::{BackoffOverrides, UnixDgramHandlerBuilder};

const HANDLER_SECTION: &str = "unix_dgram";
const PRODUCER_SECTION: &str = "producer";

/// Errors raised while loading an INI configuration.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("{0} doesn't exist")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{origin} is invalid: {message}")]
    Parse { origin: String, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Read and parse the configuration file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<UnixDgramHandlerBuilder, ConfigFileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ConfigFileError::NotFound(path.to_path_buf()),
        _ => ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    parse_named(&path.display().to_string(), &text)
}

/// Parse configuration text.
pub fn parse_config(text: &str) -> Result<UnixDgramHandlerBuilder, ConfigFileError> {
    parse_named("<string>", text)
}

fn parse_named(origin: &str, text: &str) -> Result<UnixDgramHandlerBuilder, ConfigFileError> {
    if text.trim().is_empty() {
        return Err(ConfigFileError::Parse {
            origin: origin.to_owned(),
            message: "empty configuration".into(),
        });
    }
    let ini = Ini::load_from_str(text).map_err(|err| ConfigFileError::Parse {
        origin: origin.to_owned(),
        message: err.to_string(),
    })?;
    reject_unknown_sections(&ini)?;
    let section = ini.section(Some(HANDLER_SECTION)).ok_or_else(|| {
        ConfigFileError::Invalid(format!("missing [{HANDLER_SECTION}] section"))
    })?;
    let mut builder = apply_handler_section(UnixDgramHandlerBuilder::new(), section)?;
    if let Some(producer) = ini.section(Some(PRODUCER_SECTION)) {
        for (key, value) in producer.iter() {
            builder = builder.with_producer_field(key, Value::String(value.to_owned()));
        }
    }
    Ok(builder)
}

fn reject_unknown_sections(ini: &Ini) -> Result<(), ConfigFileError> {
    for (name, props) in ini.iter() {
        match name {
            Some(HANDLER_SECTION | PRODUCER_SECTION) => {}
            None if props.is_empty() => {}
            None => {
                return Err(ConfigFileError::Invalid(
                    "keys must appear inside a section".into(),
                ));
            }
            Some(other) => {
                return Err(ConfigFileError::Invalid(format!(
                    "unknown section [{other}]"
                )));
            }
        }
    }
    Ok(())
}

fn apply_handler_section(
    mut builder: UnixDgramHandlerBuilder,
    section: &Properties,
) -> Result<UnixDgramHandlerBuilder, ConfigFileError> {
    let mut backoff = BackoffOverrides::new();
    for (key, value) in section.iter() {
        builder = match key {
            "path" => builder.with_path(value),
            "prefix" => builder.with_prefix(value),
            "queue_capacity" => builder.with_queue_capacity(number(key, value)?),
            "send_timeout_ms" => builder.with_send_timeout_ms(number(key, value)?),
            "writable_poll_interval_ms" => {
                builder.with_writable_poll_interval_ms(number(key, value)?)
            }
            "shutdown_poll_step_ms" => builder.with_shutdown_poll_step_ms(number(key, value)?),
            "shutdown_attempts" => builder.with_shutdown_attempts(number(key, value)?),
            "warn_interval_ms" => builder.with_warn_interval_ms(number(key, value)?),
            "check_path" => builder.with_check_path(flag(key, value)?),
            "backoff_base_ms" => {
                backoff = backoff.with_base_ms(number(key, value)?);
                builder
            }
            "backoff_cap_ms" => {
                backoff = backoff.with_cap_ms(number(key, value)?);
                builder
            }
            other => {
                return Err(ConfigFileError::Invalid(format!(
                    "unknown key {other:?} in [{HANDLER_SECTION}]"
                )));
            }
        };
    }
    Ok(builder.with_backoff(backoff))
}

fn number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigFileError> {
    value.trim().parse().map_err(|_| {
        ConfigFileError::Invalid(format!("{key} must be a non-negative integer, got {value:?}"))
    })
}

fn flag(key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigFileError::Invalid(format!(
            "{key} must be a boolean, got {value:?}"
        ))),
    }
}
