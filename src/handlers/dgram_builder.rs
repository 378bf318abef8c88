//! Builder for [`UnixDgramHandler`](crate::dgram_handler::UnixDgramHandler).
//!
//! Exposes the collector path, record shaping (producer fields and prefix),
//! queue sizing, send and poll timings, and exponential backoff parameters.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    dgram_handler::{BackoffPolicy, DgramHandlerConfig, TransportFactory, UnixDgramHandler},
    encoder::Prefix,
    log_record::Fields,
};

use super::{
    HandlerBuildError, HandlerBuilderTrait,
    builder_macros::{ensure_positive, option_setter},
};

/// Overrides for the reconnect backoff applied by the handler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackoffOverrides {
    base_ms: Option<u64>,
    cap_ms: Option<u64>,
}

impl BackoffOverrides {
    /// Create overrides with no custom values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the base delay in milliseconds.
    pub fn with_base_ms(mut self, base_ms: u64) -> Self {
        self.base_ms = Some(base_ms);
        self
    }

    /// Cap the reconnect delay in milliseconds.
    pub fn with_cap_ms(mut self, cap_ms: u64) -> Self {
        self.cap_ms = Some(cap_ms);
        self
    }

    fn apply(&self, policy: &mut BackoffPolicy) -> Result<(), HandlerBuildError> {
        if let Some(base) = self.base_ms {
            ensure_positive!(base, "backoff_base_ms")?;
            policy.base = Duration::from_millis(base);
        }
        if let Some(cap) = self.cap_ms {
            ensure_positive!(cap, "backoff_cap_ms")?;
            policy.cap = Some(Duration::from_millis(cap));
        }
        if let Some(cap) = policy.cap
            && cap < policy.base
        {
            return Err(HandlerBuildError::InvalidConfig(
                "backoff_cap_ms must not be smaller than backoff_base_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing [`UnixDgramHandler`] instances.
#[derive(Clone, Debug, Default)]
pub struct UnixDgramHandlerBuilder {
    path: Option<PathBuf>,
    producer: Fields,
    prefix: Option<Prefix>,
    queue_capacity: Option<usize>,
    send_timeout_ms: Option<u64>,
    writable_poll_interval_ms: Option<u64>,
    shutdown_poll_step_ms: Option<u64>,
    shutdown_attempts: Option<u32>,
    warn_interval_ms: Option<u64>,
    check_path: bool,
    backoff: BackoffOverrides,
    factory: Option<FactoryOverride>,
}

#[derive(Clone)]
struct FactoryOverride(Arc<dyn TransportFactory>);

impl std::fmt::Debug for FactoryOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FactoryOverride")
    }
}

impl UnixDgramHandlerBuilder {
    /// Create a new builder with no collector path configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target the collector socket at `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Merge `value` under `key` into every record.
    pub fn with_producer_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.producer.insert(key.into(), value.into());
        self
    }

    /// Replace the producer's default fields.
    pub fn with_producer(mut self, producer: Fields) -> Self {
        self.producer = producer;
        self
    }

    /// Prepend `prefix` verbatim to every record.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(Prefix::Static(prefix.into()));
        self
    }

    /// Prepend the output of `f`, invoked once per record.
    pub fn with_prefix_fn(mut self, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.prefix = Some(Prefix::dynamic(f));
        self
    }

    option_setter!(
        #[doc = "Set the maximum number of queued records."]
        with_queue_capacity,
        queue_capacity,
        usize
    );
    option_setter!(with_send_timeout_ms, send_timeout_ms, u64);
    option_setter!(with_writable_poll_interval_ms, writable_poll_interval_ms, u64);
    option_setter!(with_shutdown_poll_step_ms, shutdown_poll_step_ms, u64);
    option_setter!(with_shutdown_attempts, shutdown_attempts, u32);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    /// Require the socket path to exist when the handler is built.
    pub fn with_check_path(mut self, check: bool) -> Self {
        self.check_path = check;
        self
    }

    /// Override backoff timings using the provided overrides.
    pub fn with_backoff(mut self, overrides: BackoffOverrides) -> Self {
        self.backoff = overrides;
        self
    }

    /// Replace the transport factory.
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(FactoryOverride(factory));
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.validate_path()?;
        self.validate_capacity()?;
        self.validate_timings()?;
        Ok(())
    }

    fn validate_path(&self) -> Result<(), HandlerBuildError> {
        let Some(path) = self.path.as_ref() else {
            return Err(HandlerBuildError::InvalidConfig(
                "unix datagram handler requires a socket path".into(),
            ));
        };
        if path.as_os_str().is_empty() {
            return Err(HandlerBuildError::InvalidConfig(
                "socket path must not be empty".into(),
            ));
        }
        if self.check_path && !path.exists() {
            return Err(HandlerBuildError::InvalidConfig(format!(
                "socket path {} does not exist",
                path.display()
            )));
        }
        Ok(())
    }

    fn validate_capacity(&self) -> Result<(), HandlerBuildError> {
        if let Some(capacity) = self.queue_capacity {
            ensure_positive!(capacity, "queue_capacity")?;
        }
        Ok(())
    }

    fn validate_timings(&self) -> Result<(), HandlerBuildError> {
        if let Some(timeout) = self.send_timeout_ms {
            ensure_positive!(timeout, "send_timeout_ms")?;
        }
        if let Some(interval) = self.writable_poll_interval_ms {
            ensure_positive!(interval, "writable_poll_interval_ms")?;
        }
        if let Some(step) = self.shutdown_poll_step_ms {
            ensure_positive!(step, "shutdown_poll_step_ms")?;
        }
        if let Some(attempts) = self.shutdown_attempts {
            ensure_positive!(attempts, "shutdown_attempts")?;
        }
        if let Some(interval) = self.warn_interval_ms {
            ensure_positive!(interval, "warn_interval_ms")?;
        }
        Ok(())
    }

    /// Validate the builder and produce the handler configuration.
    pub fn build_config(&self) -> Result<DgramHandlerConfig, HandlerBuildError> {
        self.validate()?;
        let path = self.path.clone().unwrap_or_default();
        let mut config = DgramHandlerConfig::new(path);
        config.producer = self.producer.clone();
        config.prefix = self.prefix.clone();
        self.apply_optional_fields(&mut config);
        self.backoff.apply(&mut config.backoff)?;
        if let Some(FactoryOverride(factory)) = &self.factory {
            config.factory = Arc::clone(factory);
        }
        Ok(config)
    }

    fn apply_optional_fields(&self, config: &mut DgramHandlerConfig) {
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(timeout) = self.send_timeout_ms {
            config.send_timeout = Duration::from_millis(timeout);
        }
        if let Some(interval) = self.writable_poll_interval_ms {
            config.writable_poll_interval = Duration::from_millis(interval);
        }
        if let Some(step) = self.shutdown_poll_step_ms {
            config.shutdown.poll_step = Duration::from_millis(step);
        }
        if let Some(attempts) = self.shutdown_attempts {
            config.shutdown.max_attempts = attempts;
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(interval);
        }
    }
}

impl HandlerBuilderTrait for UnixDgramHandlerBuilder {
    type Handler = UnixDgramHandler;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        let config = self.build_config()?;
        Ok(UnixDgramHandler::with_config(config))
    }
}
