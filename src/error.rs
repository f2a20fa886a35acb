//! Custom error types for the status controller.
//!
//! `StatusError` is the single error type shared by the device-model seams, the
//! controller and the configuration layer. It is built with `thiserror` so that the
//! `?` operator converts underlying failures (figment extraction, I/O) automatically.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: a required collaborator is missing or a configuration value is
//!   semantically invalid. Raised eagerly at startup and never recovered from.
//! - **`Config`**: wraps `figment::Error` for files or environment variables that fail to
//!   parse.
//! - **`ChannelTimeout`** / **`Channel`**: failures reading a process variable. These come
//!   from the device-model layer and are passed through the controller unchanged.
//! - **`InvalidTimestamp`**: an EPICS epoch that does not map onto a calendar instant.
//! - **`RefreshTask`**: the background bulk-refresh task panicked or was cancelled.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, StatusError>;

/// Errors raised by the status controller and its collaborators.
#[derive(Error, Debug)]
pub enum StatusError {
    /// A required collaborator or configuration value is missing or invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The configuration sources could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The IOC did not answer a channel read in time.
    #[error("Timed out reading channel {channel}")]
    ChannelTimeout {
        /// Full PV name of the channel.
        channel: String,
    },

    /// A channel read failed for any other reason.
    #[error("Failed to read channel {channel}: {message}")]
    Channel {
        /// Full PV name of the channel.
        channel: String,
        /// Description of the failure.
        message: String,
    },

    /// The epoch value cannot be represented as a calendar time.
    #[error("Invalid EPICS timestamp: {0}")]
    InvalidTimestamp(f64),

    /// The bulk refresh task did not run to completion.
    #[error("Refresh task failed: {0}")]
    RefreshTask(String),

    /// The tracing subscriber could not be installed.
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl StatusError {
    /// True when the failure is a channel-access timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StatusError::ChannelTimeout { .. })
    }

    /// Name of the channel involved, if the failure came from a channel read.
    pub fn channel(&self) -> Option<&str> {
        match self {
            StatusError::ChannelTimeout { channel } | StatusError::Channel { channel, .. } => {
                Some(channel)
            }
            _ => None,
        }
    }
}

impl From<figment::Error> for StatusError {
    fn from(value: figment::Error) -> Self {
        StatusError::Config(Box::new(value))
    }
}

impl From<tokio::task::JoinError> for StatusError {
    fn from(value: tokio::task::JoinError) -> Self {
        if value.is_cancelled() {
            StatusError::RefreshTask("task was cancelled".into())
        } else {
            StatusError::RefreshTask(format!("task panicked: {value}"))
        }
    }
}
