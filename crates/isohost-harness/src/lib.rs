//! Isohost test harness
//!
//! Fixture-scoped lifecycle around [`IsolatedHost`](isohost_server::IsolatedHost):
//! a [`TestHarness`] builds a fresh host and [`TestClient`] per test case,
//! stops the host after each case and waits for its catalog to be released
//! before the next one starts.
//!
//! ```rust,no_run
//! use isohost_harness::{IsolatedFixture, TestHarness};
//! use isohost_server::ServerConfig;
//!
//! # async fn run() -> isohost_harness::Result<()> {
//! let config = ServerConfig::default().with_setting("TestLicenseKey", "DOMAIN:localhost");
//! let mut harness = TestHarness::new(IsolatedFixture::new(config));
//! harness.one_time_setup()?;
//! let status = harness
//!     .run_case(|_host, client| Box::pin(async move { client.get_status("/site").await }))
//!     .await?;
//! assert_eq!(status, 200);
//! harness.one_time_teardown();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod fixture;
pub mod harness;

pub use client::TestClient;
pub use error::{HarnessError, Result};
pub use fixture::{DEFAULT_ARTIFICIAL_DELAY, DEFAULT_STOP_TIMEOUT, Fixture, IsolatedFixture};
pub use harness::TestHarness;

/// Install a test-friendly tracing subscriber
///
/// Honors `RUST_LOG`; safe to call from every test.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
