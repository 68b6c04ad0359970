//! Error types for Isohost Core

use crate::admin::InstallLog;
use crate::platform::LifecyclePhase;
use crate::sequencer::SequencerState;
use thiserror::Error;

/// Result type alias using Isohost Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the isolated-environment orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// The database engine could not be reached at its address
    #[error("Engine unreachable at '{address}': {reason}")]
    EngineUnreachable {
        /// Engine address that was tried
        address: String,
        /// Why the connection could not be opened
        reason: String,
    },

    /// The engine rejected the creation of a catalog
    #[error("Failed to create catalog '{catalog}': {reason}")]
    CreateFailed {
        /// Catalog name
        catalog: String,
        /// Engine-reported reason
        reason: String,
    },

    /// Baseline scripts failed; the accumulated install log is attached
    #[error("Failed to install test database:\n{log}")]
    InstallFailed {
        /// Install log captured up to and including the failure
        log: InstallLog,
    },

    /// The engine reported an error while dropping a catalog
    #[error("Failed to drop catalog '{catalog}': {reason}")]
    DropFailed {
        /// Catalog name
        catalog: String,
        /// Engine-reported reason
        reason: String,
    },

    /// No license key is configured
    #[error(
        "Cannot execute tests without a test license key. Ensure `{key}` is set in the platform configuration."
    )]
    MissingLicense {
        /// Configuration key the license is read from
        key: String,
    },

    /// A configuration write was refused
    #[error("Configuration write to '{key}' failed: {reason}")]
    ConfigurationWriteFailed {
        /// Configuration key
        key: String,
        /// Why the write was refused
        reason: String,
    },

    /// A connection was opened against a catalog that does not exist
    #[error("Catalog '{0}' does not exist")]
    CatalogNotFound(String),

    /// A table was addressed that the catalog does not contain
    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    /// Catalog name failed validation
    #[error("Invalid catalog name '{0}': must be alphanumeric with _ or -")]
    InvalidCatalogName(String),

    /// Connection string could not be parsed
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// License key could not be parsed
    #[error("Invalid license key: {0}")]
    InvalidLicense(String),

    /// A lifecycle phase arrived before its predecessor completed
    #[error("Lifecycle phase {phase} arrived out of order (sequencer is {state})")]
    OutOfOrder {
        /// Phase that was delivered
        phase: LifecyclePhase,
        /// State the sequencer was in
        state: SequencerState,
    },

    /// The background task watcher is not running
    #[error("Task watcher unavailable: {0}")]
    WatcherUnavailable(String),

    /// I/O errors from engine storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LMDB/heed errors
    #[error("Database error: {0}")]
    Database(#[from] heed::Error),

    /// Record (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an engine-unreachable error
    pub fn engine_unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineUnreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a catalog creation error
    pub fn create_failed(catalog: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreateFailed {
            catalog: catalog.into(),
            reason: reason.into(),
        }
    }

    /// Create a catalog drop error
    pub fn drop_failed(catalog: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DropFailed {
            catalog: catalog.into(),
            reason: reason.into(),
        }
    }

    /// Create a refused configuration write error
    pub fn config_write(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationWriteFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is a missing precondition rather than an engine fault
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingLicense { .. } | Self::InvalidLicense(_))
    }
}
