//! Error types for the host

use thiserror::Error;

/// Result type alias using [`HostError`]
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors raised while starting, stopping or configuring a host
#[derive(Error, Debug)]
pub enum HostError {
    /// A lifecycle handler or platform service failed
    #[error(transparent)]
    Lifecycle(#[from] isohost_core::Error),

    /// Socket or file errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `start` was called on a host that was already started
    #[error("Host has already been started")]
    AlreadyStarted,

    /// The start token was cancelled before the host was serving
    #[error("Host start was cancelled")]
    Cancelled,

    /// The host was disposed and can no longer be started
    #[error("Host has been disposed")]
    Disposed,

    /// The stop token fired before the server drained; the server was aborted
    #[error("Host did not stop in time; the server task was aborted")]
    StopTimedOut,

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl HostError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The core error behind a lifecycle failure, if any
    pub fn lifecycle_error(&self) -> Option<&isohost_core::Error> {
        match self {
            Self::Lifecycle(e) => Some(e),
            _ => None,
        }
    }
}
