//! Error types for logcast
//!
//! Logging calls never surface these to the host application. They exist so
//! sinks, transports and configuration loading can report what went wrong to
//! the engine, which isolates and counts them.

use thiserror::Error;

/// Failure reported by a sink from `initialize`, `write`, `flush` or `dispose`
#[derive(Error, Debug)]
pub enum SinkError {
    /// General I/O error (file sink)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sink cannot accept entries right now
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// Sink needs a Tokio runtime and none is running on this thread
    #[error("No Tokio runtime available")]
    NoRuntime,

    /// Sink was disposed or its worker has stopped
    #[error("Sink closed")]
    Closed,

    /// Remote transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Anything else, usually from a host-supplied implementation
    #[error("{0}")]
    Other(String),
}

/// Failure reported by a [`TelemetryTransport`](crate::sink::remote::TelemetryTransport)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Backend refused the batch; retrying will not help
    #[error("Batch rejected: {0}")]
    Rejected(String),

    /// Transient network failure
    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Whether the remote sink should retry the batch
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network(_))
    }
}

/// Configuration loading or validation failure
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for `EngineConfig`
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level error for the few fallible public operations
#[derive(Error, Debug)]
pub enum LogcastError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Report text could not be formatted
    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),

    /// Unknown level name
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Unknown security severity name
    #[error("Invalid security severity: {0}")]
    InvalidSeverity(String),
}

/// Result type alias using LogcastError
pub type LogcastResult<T> = Result<T, LogcastError>;
