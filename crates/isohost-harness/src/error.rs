//! Error types for the test harness

use isohost_server::HostError;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised by the harness, its fixtures and the test client
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Starting or stopping a host failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// A core operation failed
    #[error(transparent)]
    Core(#[from] isohost_core::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Scratch directory errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Per-case setup ran before the fixture's one-time setup
    #[error("Fixture has not been set up; call one_time_setup first")]
    FixtureNotStarted,

    /// A per-case operation ran without a host and client
    #[error("No host is set up for the current test case")]
    NotSetUp,

    /// The host has no listening address to derive a client from
    #[error("Host is not serving; cannot create a client")]
    HostNotServing,

    /// The previous host's store was still held after the release timeout
    #[error("Catalog '{catalog}' was not released in time")]
    ReleaseTimeout {
        /// Catalog still open or present
        catalog: String,
    },
}

impl HarnessError {
    /// The core error behind this failure, if any
    pub fn core_error(&self) -> Option<&isohost_core::Error> {
        match self {
            Self::Core(e) => Some(e),
            Self::Host(e) => e.lifecycle_error(),
            _ => None,
        }
    }
}
