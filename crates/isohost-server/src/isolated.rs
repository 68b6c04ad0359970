//! Isolated host
//!
//! Wraps a [`PlatformHost`] with a private backing store: a fresh
//! [`ResourceIdentity`] names the catalog, a [`LifecycleSequencer`] creates it
//! during PreInit and drops it during Finalize.

use crate::config::ServerConfig;
use crate::error::{HostError, Result};
use crate::host::{Host, HostBuilder, PlatformHost};
use async_trait::async_trait;
use isohost_core::descriptor::{ConnectionDescriptor, EngineDescriptor};
use isohost_core::identity::{DEFAULT_CATALOG_PREFIX, ResourceIdentity};
use isohost_core::platform::{Platform, Subscription};
use isohost_core::sequencer::{LifecycleSequencer, SequencerState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How an isolated host picks its store
#[derive(Debug, Clone)]
pub struct IsolationSettings {
    /// Use this identity instead of generating one
    pub identity: Option<ResourceIdentity>,
    /// Prefix of generated catalog names
    pub catalog_prefix: String,
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self {
            identity: None,
            catalog_prefix: DEFAULT_CATALOG_PREFIX.to_string(),
        }
    }
}

impl IsolationSettings {
    /// Settings taken from `[isolation]`
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            identity: None,
            catalog_prefix: config.isolation.catalog_prefix.clone(),
        }
    }

    /// Point the host at a known identity
    pub fn with_identity(mut self, identity: ResourceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// Outcome of disposing an isolated host
#[derive(Debug, Default)]
pub struct DisposeReport {
    /// Whether Finalize reached the sequencer through the host
    pub finalized_by_host: bool,
    /// Errors recorded while tearing the store down
    pub teardown_errors: Vec<isohost_core::Error>,
}

impl DisposeReport {
    /// Whether teardown completed without errors
    pub fn is_clean(&self) -> bool {
        self.teardown_errors.is_empty()
    }
}

/// A platform host that owns a private backing store
pub struct IsolatedHost {
    host: Option<PlatformHost>,
    identity: ResourceIdentity,
    descriptor: ConnectionDescriptor,
    sequencer: Arc<LifecycleSequencer>,
    subscriptions: Vec<Subscription>,
    disposed: bool,
}

impl IsolatedHost {
    /// Build the host and subscribe its sequencer without starting it
    pub fn create(builder: HostBuilder, settings: IsolationSettings) -> Self {
        let engine = builder.config().engine_descriptor();
        let install = builder.config().install_settings();
        let host = builder.build();

        let identity = settings
            .identity
            .unwrap_or_else(|| ResourceIdentity::with_prefix(&settings.catalog_prefix));
        let descriptor = ConnectionDescriptor::new(engine, identity.derived_name());

        let sequencer = Arc::new(LifecycleSequencer::new(
            descriptor.clone(),
            host.platform(),
            install,
        ));
        let subscriptions = LifecycleSequencer::subscribe(&sequencer, host.platform().lifecycle());

        tracing::debug!("Created isolated host for catalog '{}'", identity);
        Self {
            host: Some(host),
            identity,
            descriptor,
            sequencer,
            subscriptions,
            disposed: false,
        }
    }

    /// Build, subscribe and start
    ///
    /// When start fails the host is disposed before the error is returned.
    pub async fn start_new(builder: HostBuilder, settings: IsolationSettings) -> Result<Self> {
        let mut host = Self::create(builder, settings);
        if let Err(e) = host.start(CancellationToken::new()).await {
            let report = host.dispose();
            for err in &report.teardown_errors {
                tracing::warn!("Teardown after failed start: {}", err);
            }
            return Err(e);
        }
        Ok(host)
    }

    /// Catalog-qualified connection string of the private store
    pub fn connection_string(&self) -> String {
        self.descriptor.connection_string()
    }

    /// Generated identifier
    pub fn identifier(&self) -> Uuid {
        self.identity.id()
    }

    /// Identity of the private store
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Name of the private catalog
    pub fn catalog_name(&self) -> &str {
        self.descriptor.catalog_name()
    }

    /// Engine the private catalog lives on
    pub fn engine_descriptor(&self) -> &EngineDescriptor {
        self.descriptor.engine_view()
    }

    /// Base URL of the running host
    pub fn base_url(&self) -> Option<String> {
        self.local_addr().map(|addr| format!("http://{}", addr))
    }

    /// Platform of the wrapped host, until disposal
    pub fn platform(&self) -> Option<&Platform> {
        self.host.as_ref().map(PlatformHost::platform)
    }

    /// Where the sequencer is in the lifecycle
    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Whether the store has been dropped
    pub fn is_released(&self) -> bool {
        self.sequencer.state() == SequencerState::Finalized
    }

    /// Release subscriptions, the wrapped host and the store
    ///
    /// Subscriptions are released before the host is dropped. If Finalize
    /// never reached the sequencer the store is dropped here. Never fails;
    /// teardown errors are returned in the report.
    pub fn dispose(&mut self) -> DisposeReport {
        if self.disposed {
            return DisposeReport::default();
        }
        self.disposed = true;

        if let Some(host) = self.host.take() {
            let lifecycle = host.platform().lifecycle();
            for subscription in self.subscriptions.drain(..) {
                lifecycle.unsubscribe(subscription);
            }
            drop(host);
        }

        let finalized_by_host = self.sequencer.state() == SequencerState::Finalized;
        if !finalized_by_host {
            tracing::debug!(
                "Finalize never delivered for '{}'; tearing down directly",
                self.identity
            );
            self.sequencer.teardown();
        }

        let report = DisposeReport {
            finalized_by_host,
            teardown_errors: self.sequencer.take_teardown_errors(),
        };
        tracing::debug!("Disposed isolated host '{}'", self.identity);
        report
    }
}

#[async_trait]
impl Host for IsolatedHost {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        match &self.host {
            Some(host) => host.start(cancel).await,
            None => Err(HostError::Disposed),
        }
    }

    async fn stop(&self, cancel: CancellationToken) -> Result<()> {
        match &self.host {
            Some(host) => host.stop(cancel).await,
            None => Ok(()),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.host.as_ref().and_then(|h| h.local_addr())
    }
}

impl Drop for IsolatedHost {
    fn drop(&mut self) {
        let report = self.dispose();
        for err in report.teardown_errors {
            tracing::warn!("Teardown error while dropping isolated host: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isohost_core::config::keys;
    use isohost_core::testing::TestContext;

    fn builder(ctx: &TestContext) -> HostBuilder {
        HostBuilder::new(
            ServerConfig::default()
                .with_engine_address(ctx.address())
                .with_setting(keys::TEST_LICENSE_KEY, "DOMAIN:localhost"),
        )
    }

    #[test]
    fn test_create_subscribes_every_phase() {
        let ctx = TestContext::new();
        let mut host = IsolatedHost::create(builder(&ctx), IsolationSettings::default());

        let lifecycle = host.platform().unwrap().lifecycle().clone();
        for phase in isohost_core::platform::LifecyclePhase::ALL {
            assert_eq!(lifecycle.subscriber_count(phase), 1);
        }
        assert!(host.catalog_name().starts_with("ISO_TEST_"));
        assert!(host.connection_string().contains(host.catalog_name()));

        let report = host.dispose();
        assert!(report.is_clean());
        assert!(!report.finalized_by_host);
        for phase in isohost_core::platform::LifecyclePhase::ALL {
            assert_eq!(lifecycle.subscriber_count(phase), 0);
        }
        assert!(host.is_released());
    }

    #[test]
    fn test_identity_from_settings() {
        let ctx = TestContext::new();
        let identity = ResourceIdentity::with_prefix("FIXED_");
        let host = IsolatedHost::create(
            builder(&ctx),
            IsolationSettings::default().with_identity(identity.clone()),
        );
        assert_eq!(host.identifier(), identity.id());
        assert_eq!(host.catalog_name(), identity.derived_name());
    }

    #[tokio::test]
    async fn test_dispose_without_stop_drops_store() {
        let ctx = TestContext::new();
        let mut host = IsolatedHost::start_new(builder(&ctx), IsolationSettings::default())
            .await
            .unwrap();
        let engine = isohost_core::engine::LocalEngine::connect(&ctx.address()).unwrap();
        assert!(engine.catalog_exists(host.catalog_name()));

        let report = host.dispose();
        assert!(report.is_clean());
        assert!(!report.finalized_by_host);
        assert!(!engine.catalog_exists(host.catalog_name()));

        // Second disposal is a no-op
        assert!(host.dispose().is_clean());
    }

    #[tokio::test]
    async fn test_start_after_dispose_fails() {
        let ctx = TestContext::new();
        let mut host = IsolatedHost::create(builder(&ctx), IsolationSettings::default());
        host.dispose();

        assert!(matches!(
            host.start(CancellationToken::new()).await,
            Err(HostError::Disposed)
        ));
        assert!(host.platform().is_none());
        assert!(host.local_addr().is_none());
    }
}
