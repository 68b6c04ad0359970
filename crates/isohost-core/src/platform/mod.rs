//! The hosted platform
//!
//! Bundles the services application code and the lifecycle sequencer share:
//! configuration, the lifecycle bus, the backing-store admin, the current
//! site, side-effect feature switches and the background task watcher.
//! Every host owns its own [`Platform`]; nothing here is process-global.

mod features;
mod license;
mod lifecycle;
mod sites;
mod watcher;

pub use features::{Feature, FeatureSwitches, SuppressionGuard};
pub use license::{LICENSES_TABLE, LicenseKey, LicenseRecord};
pub use lifecycle::{LifecycleBus, LifecycleHandler, LifecyclePhase, Subscription};
pub use sites::{DEFAULT_SITE_NAME, SITES_TABLE, SiteContext, SiteInfo, SiteStatus};
pub use watcher::{DEFAULT_POLL_INTERVAL, TASKS_DIR, TaskWatcher};

use crate::admin::BackingStoreAdmin;
use crate::config::{ConfigStore, ConfigurationGateway, keys};
use crate::descriptor::CatalogDescriptor;
use crate::engine::CatalogSession;
use crate::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared platform services of one host
#[derive(Clone)]
pub struct Platform {
    config: Arc<ConfigStore>,
    lifecycle: Arc<LifecycleBus>,
    admin: Arc<dyn BackingStoreAdmin>,
    sites: Arc<SiteContext>,
    features: Arc<FeatureSwitches>,
    watcher: Arc<TaskWatcher>,
}

impl Platform {
    /// Platform over `config`, administering stores through `admin`
    pub fn new(config: ConfigStore, admin: Arc<dyn BackingStoreAdmin>) -> Self {
        Self {
            config: Arc::new(config),
            lifecycle: Arc::new(LifecycleBus::new()),
            admin,
            sites: Arc::new(SiteContext::new()),
            features: Arc::new(FeatureSwitches::new()),
            watcher: Arc::new(TaskWatcher::default()),
        }
    }

    /// Configuration store
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Forced-write access to configuration
    pub fn gateway(&self) -> ConfigurationGateway {
        ConfigurationGateway::new(self.config.clone())
    }

    /// Lifecycle bus
    pub fn lifecycle(&self) -> &Arc<LifecycleBus> {
        &self.lifecycle
    }

    /// Backing-store admin
    pub fn admin(&self) -> &Arc<dyn BackingStoreAdmin> {
        &self.admin
    }

    /// Current-site context
    pub fn sites(&self) -> &Arc<SiteContext> {
        &self.sites
    }

    /// Feature switches
    pub fn features(&self) -> &Arc<FeatureSwitches> {
        &self.features
    }

    /// Background task watcher
    pub fn watcher(&self) -> &Arc<TaskWatcher> {
        &self.watcher
    }

    /// Configured physical path of the web application
    pub fn physical_path(&self) -> Option<PathBuf> {
        self.config
            .get(keys::PHYSICAL_PATH)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Current site, if one is selected
    pub fn current_site(&self) -> Option<SiteInfo> {
        self.sites.current()
    }

    /// Open a session on the catalog named by the configured connection string
    pub fn open_catalog(&self) -> Result<CatalogSession> {
        let connection = self.config.get(keys::PLATFORM_CONNECTION).ok_or_else(|| {
            Error::InvalidConnectionString(format!(
                "'{}' is not configured",
                keys::PLATFORM_CONNECTION
            ))
        })?;
        let target = CatalogDescriptor::parse(&connection)?;
        self.admin.connect(&target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::EngineAdmin;
    use crate::testing::setup_test_platform;

    #[test]
    fn test_open_catalog_requires_connection_string() {
        let platform = Platform::new(ConfigStore::new(), Arc::new(EngineAdmin::new()));
        assert!(matches!(
            platform.open_catalog(),
            Err(Error::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn test_open_catalog_from_configuration() {
        let (platform, engine, _ctx) = setup_test_platform(&[]).unwrap();
        platform.admin().create("ISO_TEST_p", &engine).unwrap();

        let target = engine.with_catalog("ISO_TEST_p");
        platform
            .gateway()
            .set_connection_string(Some(&target.connection_string()))
            .unwrap();

        let session = platform.open_catalog().unwrap();
        assert_eq!(session.catalog(), "ISO_TEST_p");
    }

    #[test]
    fn test_physical_path() {
        let platform = Platform::new(
            ConfigStore::from_pairs([(keys::PHYSICAL_PATH, "/srv/app")]),
            Arc::new(EngineAdmin::new()),
        );
        assert_eq!(platform.physical_path(), Some(PathBuf::from("/srv/app")));
    }
}
