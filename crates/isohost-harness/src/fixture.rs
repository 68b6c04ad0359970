//! Fixtures
//!
//! A [`Fixture`] tells the [`TestHarness`](crate::TestHarness) how to build,
//! stop and dispose one host/client pair. Every step has an override point;
//! [`IsolatedFixture`] is the implementation backed by [`IsolatedHost`].

use crate::client::TestClient;
use crate::error::{HarnessError, Result};
use async_trait::async_trait;
use isohost_core::admin::BackingStoreAdmin;
use isohost_core::config::keys;
use isohost_core::engine::LocalEngine;
use isohost_server::{Host, HostBuilder, IsolatedHost, IsolationSettings, ServerConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Pause after each stop before the next host may start
pub const DEFAULT_ARTIFICIAL_DELAY: Duration = Duration::from_millis(1_500);

/// Upper bound on stopping a host before the stop is cancelled
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Builds and releases the host/client pair of each test case
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Host under test
    type Host: Send + Sync + 'static;
    /// Client talking to the host
    type Client: Send + Sync + 'static;

    /// Construct and start a host whose physical path is `scratch`
    async fn create_host(&self, scratch: &Path) -> Result<Self::Host>;

    /// Derive a client from a started host
    fn create_client(&self, host: &Self::Host) -> Result<Self::Client>;

    /// Stop the host; `cancel` fires when the stop timeout elapses
    async fn stop_host(&self, host: &Self::Host, cancel: CancellationToken) -> Result<()>;

    /// Release a client; never fails
    fn dispose_client(&self, client: Self::Client) {
        drop(client);
    }

    /// Release a host; never fails
    fn dispose_host(&self, host: Self::Host) {
        drop(host);
    }

    /// Wait until a stopped host no longer holds its resources
    async fn wait_for_release(&self, _host: &Self::Host) -> Result<()> {
        Ok(())
    }

    /// Pause after each stop
    fn artificial_delay(&self) -> Duration {
        DEFAULT_ARTIFICIAL_DELAY
    }

    /// Stop timeout
    fn stop_timeout(&self) -> Duration {
        DEFAULT_STOP_TIMEOUT
    }
}

/// Fixture of isolated hosts, one private catalog per test case
pub struct IsolatedFixture {
    config: ServerConfig,
    admin: Option<Arc<dyn BackingStoreAdmin>>,
    artificial_delay: Duration,
    stop_timeout: Duration,
    release_timeout: Duration,
}

impl IsolatedFixture {
    /// Fixture building hosts from `config`
    pub fn new(config: ServerConfig) -> Self {
        Self {
            artificial_delay: config.artificial_delay(),
            release_timeout: config.release_timeout(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            admin: None,
            config,
        }
    }

    /// Administer stores through `admin`
    pub fn with_admin(mut self, admin: Arc<dyn BackingStoreAdmin>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Override the post-stop pause
    pub fn with_artificial_delay(mut self, delay: Duration) -> Self {
        self.artificial_delay = delay;
        self
    }

    /// Override the stop timeout
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Override how long catalog drops and the release barrier wait
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.release_timeout_ms = timeout.as_millis() as u64;
        self.release_timeout = timeout;
        self
    }

    /// Configuration hosts are built from
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[async_trait]
impl Fixture for IsolatedFixture {
    type Host = IsolatedHost;
    type Client = TestClient;

    async fn create_host(&self, scratch: &Path) -> Result<IsolatedHost> {
        let config = self
            .config
            .clone()
            .with_setting(keys::PHYSICAL_PATH, scratch.to_string_lossy());
        let settings = IsolationSettings::from_config(&config);

        let mut builder = HostBuilder::new(config);
        if let Some(admin) = &self.admin {
            builder = builder.with_admin(admin.clone());
        }

        let host = IsolatedHost::start_new(builder, settings).await?;
        tracing::debug!("Fixture host started on catalog '{}'", host.catalog_name());
        Ok(host)
    }

    fn create_client(&self, host: &IsolatedHost) -> Result<TestClient> {
        TestClient::for_host(host)
    }

    async fn stop_host(&self, host: &IsolatedHost, cancel: CancellationToken) -> Result<()> {
        Ok(host.stop(cancel).await?)
    }

    fn dispose_host(&self, mut host: IsolatedHost) {
        let report = host.dispose();
        for err in report.teardown_errors {
            tracing::warn!(
                "Teardown error disposing host '{}': {}",
                host.catalog_name(),
                err
            );
        }
    }

    async fn wait_for_release(&self, host: &IsolatedHost) -> Result<()> {
        let engine = LocalEngine::connect(host.engine_descriptor().address())?;
        let catalog = host.catalog_name();
        let deadline = Instant::now() + self.release_timeout;

        while engine.is_catalog_open(catalog) || engine.catalog_exists(catalog) {
            if Instant::now() >= deadline {
                return Err(HarnessError::ReleaseTimeout {
                    catalog: catalog.to_string(),
                });
            }
            tokio::time::sleep(RELEASE_POLL_INTERVAL).await;
        }
        Ok(())
    }

    fn artificial_delay(&self) -> Duration {
        self.artificial_delay
    }

    fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }
}
