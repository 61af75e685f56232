//! Custom error types for the pipeline.
//!
//! This module defines the primary error type, `StreamError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the few things that can go wrong outside the statistics engine, which never raises
//! and instead surfaces domain errors as IEEE-754 NaN/Inf.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically TOML parse failures or
//!   environment values of the wrong type.
//! - **`Configuration`**: Semantic errors caught by `StreamConfig::validate`, such as a
//!   send ring too small to hold a full report burst.
//! - **`Io`**: Wraps `std::io::Error` for the host tools.
//! - **`InvalidCapacity`**, **`Overrun`**, **`Underrun`**: Ring buffer sizing and
//!   index-arithmetic failures. None of these allocate, so they are safe to construct
//!   from interrupt context.
//! - **`FrameLength`**: A wire frame of the wrong size.
//! - **`ReadNotArmed`**: Bytes were delivered while no read was outstanding.
//! - **`Logging`**: The tracing subscriber could not be installed.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type StreamResult<T> = std::result::Result<T, StreamError>;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ring buffer needs at least 2 slots, got {0}")]
    InvalidCapacity(usize),

    #[error("Ring buffer overrun: {requested} slots requested, {free} free")]
    Overrun { requested: usize, free: usize },

    #[error("Ring buffer underrun: {requested} slots requested, {available} available")]
    Underrun { requested: usize, available: usize },

    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("Received {0} bytes with no read armed")]
    ReadNotArmed(usize),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl StreamError {
    /// Whether the pipeline can keep running after this error.
    ///
    /// Ring and frame errors cost at most one sample or one report; configuration and
    /// start-up errors leave nothing to run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            StreamError::Overrun { .. }
            | StreamError::Underrun { .. }
            | StreamError::FrameLength { .. }
            | StreamError::ReadNotArmed(_) => true,
            StreamError::Config(_)
            | StreamError::Configuration(_)
            | StreamError::Io(_)
            | StreamError::InvalidCapacity(_)
            | StreamError::Logging(_) => false,
        }
    }
}
