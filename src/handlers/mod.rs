//! Handler builders and associated traits.
//!
//! Provides a minimal builder API for constructing handlers in a
//! type‑safe manner. Each builder implements [`HandlerBuilderTrait`]
//! and can hand back either the concrete handler or a boxed
//! [`LogTransport`] ready to be shared between threads.

use std::io;

use thiserror::Error;

use crate::handler::LogTransport;

pub(crate) mod builder_macros;
pub mod dgram_builder;
#[cfg(test)]
mod test_helpers;

pub use dgram_builder::{BackoffOverrides, UnixDgramHandlerBuilder};

/// Errors that may occur while building a handler.
#[derive(Debug, Error)]
pub enum HandlerBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid handler configuration: {0}")]
    InvalidConfig(String),
    /// Underlying I/O error whilst creating the handler.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Trait implemented by all handler builders.
pub trait HandlerBuilderTrait: Send + Sync {
    /// Concrete handler produced by the builder.
    type Handler: LogTransport + 'static;

    /// Validate the configuration and construct the concrete handler.
    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError>;

    /// Build the handler behind a [`LogTransport`] trait object.
    fn build(&self) -> Result<Box<dyn LogTransport>, HandlerBuildError> {
        Ok(Box::new(self.build_inner()?))
    }
}
