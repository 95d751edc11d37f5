//! Error types for instrument drivers.
//!
//! Two enums, both built with `thiserror`:
//!
//! - **`TransportError`**: failures reported by a [`Transport`](crate::transport::Transport).
//!   The `Timeout` variant is kept distinct from every other I/O failure because
//!   the polling routines in [`acquisition`](crate::acquisition) treat it as
//!   "not done yet" rather than as a fatal error.
//! - **`ScpiError`**: everything a driver call can fail with. Caller mistakes
//!   (`InvalidValue`, `InvalidChannel`, `UnknownAttribute`, ...) are raised
//!   before any byte is written to the transport. `Timeout` is the fatal
//!   deadline error of the bounded waits and carries the computed deadline.
//!
//! Identity parsing failures never show up here: the instrument handle falls
//! back to the driver's hardcoded manufacturer and model instead.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type ScpiResult<T> = std::result::Result<T, ScpiError>;

/// Failure reported by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No reply (or not enough bytes) arrived within the transport's own timeout.
    #[error("Transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether this is the transient per-operation timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// Error returned by instrument, attribute and acquisition operations.
#[derive(Error, Debug)]
pub enum ScpiError {
    #[error("Invalid value {value} for '{attribute}': expected {expected}")]
    InvalidValue {
        attribute: String,
        value: String,
        expected: String,
    },

    #[error("Invalid channel {channel} for {instrument}: valid channels are 1..={available}")]
    InvalidChannel {
        instrument: String,
        channel: u8,
        available: u8,
    },

    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    #[error("Attribute '{0}' cannot be read")]
    NotReadable(String),

    #[error("Attribute '{0}' cannot be written")]
    NotWritable(String),

    #[error("Command template error: {0}")]
    Template(String),

    #[error("Cannot parse reply {reply:?} to '{command}' as {expected}")]
    Parse {
        command: String,
        reply: String,
        expected: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{operation} did not complete within {deadline:?} (elapsed {elapsed:?})")]
    Timeout {
        operation: &'static str,
        deadline: Duration,
        elapsed: Duration,
    },

    #[error("Operation '{operation}' is not supported by {driver}")]
    Unsupported {
        driver: &'static str,
        operation: &'static str,
    },

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl ScpiError {
    /// Whether this error wraps a transient transport timeout.
    pub fn is_transport_timeout(&self) -> bool {
        matches!(self, ScpiError::Transport(err) if err.is_timeout())
    }

    pub(crate) fn parse(command: &str, reply: &str, expected: impl Into<String>) -> Self {
        ScpiError::Parse {
            command: command.to_string(),
            reply: reply.to_string(),
            expected: expected.into(),
        }
    }
}

impl From<figment::Error> for ScpiError {
    fn from(err: figment::Error) -> Self {
        ScpiError::ConfigLoad(Box::new(err))
    }
}
