//! Isohost Server - Generic platform host and isolated test host
//!
//! - [`host`]: the [`Host`] contract, [`HostBuilder`] and the axum-based
//!   [`PlatformHost`] that fires platform lifecycle phases around serving
//! - [`isolated`]: [`IsolatedHost`], a host bound to a private, disposable
//!   backing store
//! - [`middleware`]: request-scoped feature suppression
//! - [`api`]: the sample application endpoints

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod host;
pub mod isolated;
pub mod middleware;

pub use config::ServerConfig;
pub use error::{HostError, Result};
pub use host::{Host, HostBuilder, PlatformHost};
pub use isolated::{DisposeReport, IsolatedHost, IsolationSettings};
