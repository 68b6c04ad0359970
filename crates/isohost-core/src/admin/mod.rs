//! Backing-store administration
//!
//! Leaf operations against the database engine. Existence checks, creation
//! and drops take the catalog-less [`EngineDescriptor`]; installation and
//! sessions take a [`CatalogDescriptor`].

mod scripts;

pub use scripts::{
    HOTFIX_DIR, InstallLog, InstallSettings, LogEntry, LogLevel, ScriptSource, install,
};

use crate::descriptor::{CatalogDescriptor, EngineDescriptor};
use crate::engine::{CatalogSession, DEFAULT_RELEASE_TIMEOUT, LocalEngine};
use crate::{Error, Result};
use std::time::Duration;

/// Administrative operations on the engine that hosts test catalogs
///
/// Implementations are stateless: every call carries its own descriptor.
pub trait BackingStoreAdmin: Send + Sync {
    /// Whether `catalog` exists on the engine
    fn exists(&self, engine: &EngineDescriptor, catalog: &str) -> Result<bool>;

    /// Create an empty catalog
    fn create(&self, catalog: &str, engine: &EngineDescriptor) -> Result<()>;

    /// Apply baseline scripts to an existing catalog
    fn install_baseline(
        &self,
        target: &CatalogDescriptor,
        settings: &InstallSettings,
    ) -> Result<InstallLog>;

    /// Drop a catalog; dropping a missing catalog succeeds
    fn drop_catalog(&self, catalog: &str, engine: &EngineDescriptor) -> Result<()>;

    /// Open a session on an existing catalog
    fn connect(&self, target: &CatalogDescriptor) -> Result<CatalogSession>;
}

/// [`BackingStoreAdmin`] over the local LMDB engine
#[derive(Debug, Clone, Copy)]
pub struct EngineAdmin {
    /// How long a drop waits for open sessions to close
    release_timeout: Duration,
}

impl Default for EngineAdmin {
    fn default() -> Self {
        Self {
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }
}

impl EngineAdmin {
    /// Create the admin
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `timeout` for open sessions when dropping
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Drop wait
    pub fn release_timeout(&self) -> Duration {
        self.release_timeout
    }
}

impl BackingStoreAdmin for EngineAdmin {
    fn exists(&self, engine: &EngineDescriptor, catalog: &str) -> Result<bool> {
        let engine = LocalEngine::connect(engine.address())?;
        Ok(engine.catalog_exists(catalog))
    }

    fn create(&self, catalog: &str, engine: &EngineDescriptor) -> Result<()> {
        let engine = LocalEngine::connect(engine.address())?;
        engine.create_catalog(catalog)
    }

    fn install_baseline(
        &self,
        target: &CatalogDescriptor,
        settings: &InstallSettings,
    ) -> Result<InstallLog> {
        let session = self.connect(target)?;
        let log = install(&session, settings)?;
        tracing::info!(
            "Installed baseline into '{}' ({} log entries)",
            target.catalog(),
            log.entries().len()
        );
        Ok(log)
    }

    fn drop_catalog(&self, catalog: &str, engine: &EngineDescriptor) -> Result<()> {
        let engine = LocalEngine::connect(engine.address())?;
        if !engine.drop_catalog(catalog, self.release_timeout)? {
            tracing::debug!("Catalog '{}' was already absent", catalog);
        }
        Ok(())
    }

    fn connect(&self, target: &CatalogDescriptor) -> Result<CatalogSession> {
        let engine = LocalEngine::connect(target.engine().address())?;
        engine.open_session(target.catalog()).map_err(|e| match e {
            Error::InvalidCatalogName(name) => Error::CatalogNotFound(name),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::setup_test_engine;

    #[test]
    fn test_exists_create_drop() {
        let (admin, engine, _ctx) = setup_test_engine().unwrap();

        assert!(!admin.exists(&engine, "ISO_TEST_a").unwrap());
        admin.create("ISO_TEST_a", &engine).unwrap();
        assert!(admin.exists(&engine, "ISO_TEST_a").unwrap());

        admin.drop_catalog("ISO_TEST_a", &engine).unwrap();
        assert!(!admin.exists(&engine, "ISO_TEST_a").unwrap());
    }

    #[test]
    fn test_drop_missing_catalog_succeeds() {
        let (admin, engine, _ctx) = setup_test_engine().unwrap();
        admin.drop_catalog("ISO_TEST_missing", &engine).unwrap();
    }

    #[test]
    fn test_drop_waits_for_sessions_up_to_release_timeout() {
        let (admin, engine, _ctx) = setup_test_engine().unwrap();
        let admin = admin.with_release_timeout(Duration::from_millis(50));
        admin.create("ISO_TEST_busy", &engine).unwrap();

        let session = admin.connect(&engine.with_catalog("ISO_TEST_busy")).unwrap();
        assert!(matches!(
            admin.drop_catalog("ISO_TEST_busy", &engine),
            Err(Error::DropFailed { .. })
        ));
        assert!(admin.exists(&engine, "ISO_TEST_busy").unwrap());

        drop(session);
        admin.drop_catalog("ISO_TEST_busy", &engine).unwrap();
        assert!(!admin.exists(&engine, "ISO_TEST_busy").unwrap());
    }

    #[test]
    fn test_unreachable_engine() {
        let admin = EngineAdmin::new();
        let engine = EngineDescriptor::new("/nonexistent/isohost/engine");
        assert!(matches!(
            admin.exists(&engine, "x"),
            Err(Error::EngineUnreachable { .. })
        ));
    }

    #[test]
    fn test_connect_requires_catalog() {
        let (admin, engine, _ctx) = setup_test_engine().unwrap();
        let target = engine.with_catalog("ISO_TEST_absent");
        assert!(matches!(
            admin.connect(&target),
            Err(Error::CatalogNotFound(_))
        ));
    }

    #[test]
    fn test_install_baseline() {
        let (admin, engine, _ctx) = setup_test_engine().unwrap();
        admin.create("ISO_TEST_b", &engine).unwrap();

        let target = engine.with_catalog("ISO_TEST_b");
        let log = admin
            .install_baseline(&target, &InstallSettings::default())
            .unwrap();
        assert!(!log.has_errors());

        let session = admin.connect(&target).unwrap();
        assert!(session.has_table("sites").unwrap());
    }
}
