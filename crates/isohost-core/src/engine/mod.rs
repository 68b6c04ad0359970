//! Local catalog engine
//!
//! Stands in for a relational engine. The engine address is a data directory;
//! each catalog lives in its own subdirectory holding one LMDB environment:
//!
//! ```text
//! <address>/
//!   ISO_TEST_<uuid>/
//!     data.mdb
//!     lock.mdb
//! ```
//!
//! Engines are registered process-wide by canonical address so every admin
//! call against the same address shares the cached LMDB environments. An
//! engine with no open catalogs and no outside handle is unregistered on the
//! next connect.

mod session;

pub use session::CatalogSession;

use crate::{Error, Result};
use heed::{Env, EnvOpenOptions};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// LMDB map size per catalog
const CATALOG_MAP_SIZE: usize = 64 * 1024 * 1024;

/// Maximum number of tables per catalog
const CATALOG_MAX_TABLES: u32 = 32;

/// File that marks a directory as a catalog
const CATALOG_DATA_FILE: &str = "data.mdb";

/// How long a drop waits for outstanding handles to close by default
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

static ENGINES: LazyLock<Mutex<HashMap<PathBuf, Arc<LocalEngine>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A catalog engine rooted at a data directory
pub struct LocalEngine {
    /// Canonical data directory
    base_dir: PathBuf,
    /// Open LMDB environments by catalog name
    catalogs: RwLock<HashMap<String, Env>>,
}

impl LocalEngine {
    /// Connect to the engine at `address`
    ///
    /// The address must be an existing directory; otherwise the engine is
    /// unreachable.
    pub fn connect(address: &str) -> Result<Arc<Self>> {
        let path = Path::new(address);
        if !path.is_dir() {
            return Err(Error::engine_unreachable(
                address,
                "data directory does not exist",
            ));
        }
        let base_dir = path
            .canonicalize()
            .map_err(|e| Error::engine_unreachable(address, e.to_string()))?;

        let mut engines = ENGINES.lock();
        engines.retain(|_, engine| Arc::strong_count(engine) > 1 || engine.has_open_catalogs());
        let engine = engines
            .entry(base_dir.clone())
            .or_insert_with(|| {
                tracing::debug!("Registering local engine at {}", base_dir.display());
                Arc::new(Self {
                    base_dir: base_dir.clone(),
                    catalogs: RwLock::new(HashMap::new()),
                })
            })
            .clone();
        Ok(engine)
    }

    /// Data directory of this engine
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn has_open_catalogs(&self) -> bool {
        !self.catalogs.read().is_empty()
    }

    #[cfg(test)]
    fn is_registered(base_dir: &Path) -> bool {
        ENGINES.lock().contains_key(base_dir)
    }

    fn catalog_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Validate a catalog name
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidCatalogName(name.to_string()));
        }
        Ok(())
    }

    /// Check whether a catalog exists on disk
    pub fn catalog_exists(&self, name: &str) -> bool {
        self.catalog_path(name).join(CATALOG_DATA_FILE).is_file()
    }

    /// Whether an LMDB environment for the catalog is currently open
    pub fn is_catalog_open(&self, name: &str) -> bool {
        self.catalogs.read().contains_key(name)
    }

    /// Create an empty catalog
    pub fn create_catalog(&self, name: &str) -> Result<()> {
        Self::validate_name(name).map_err(|e| Error::create_failed(name, e.to_string()))?;

        let mut catalogs = self.catalogs.write();

        if self.catalog_exists(name) {
            return Err(Error::create_failed(name, "catalog already exists"));
        }

        let path = self.catalog_path(name);
        std::fs::create_dir_all(&path).map_err(|e| Error::create_failed(name, e.to_string()))?;

        let env = Self::open_env(&path).map_err(|e| Error::create_failed(name, e.to_string()))?;
        catalogs.insert(name.to_string(), env);

        tracing::info!("Created catalog '{}' at {}", name, path.display());
        Ok(())
    }

    /// Open a session on an existing catalog
    pub fn open_session(&self, name: &str) -> Result<CatalogSession> {
        Self::validate_name(name)?;

        if let Some(env) = self.catalogs.read().get(name) {
            return Ok(CatalogSession::new(name, env.clone()));
        }

        let mut catalogs = self.catalogs.write();
        if let Some(env) = catalogs.get(name) {
            return Ok(CatalogSession::new(name, env.clone()));
        }

        if !self.catalog_exists(name) {
            return Err(Error::CatalogNotFound(name.to_string()));
        }

        let env = Self::open_env(&self.catalog_path(name))?;
        catalogs.insert(name.to_string(), env.clone());
        Ok(CatalogSession::new(name, env))
    }

    /// Drop a catalog (delete all data)
    ///
    /// Blocks until every session on the catalog is closed, at most
    /// `release_timeout`; files are never removed under an open session.
    /// Returns `false` when there was nothing to drop.
    pub fn drop_catalog(&self, name: &str, release_timeout: Duration) -> Result<bool> {
        Self::validate_name(name).map_err(|e| Error::drop_failed(name, e.to_string()))?;

        let env = self.catalogs.write().remove(name);
        if let Some(env) = env {
            let closing = env.prepare_for_closing();
            if !closing.wait_timeout(release_timeout) {
                tracing::warn!(
                    "Catalog '{}' still has open handles after {:?}",
                    name,
                    release_timeout
                );
                return Err(Error::drop_failed(
                    name,
                    format!("handles still open after {:?}", release_timeout),
                ));
            }
        }

        let path = self.catalog_path(name);
        if !path.exists() {
            return Ok(false);
        }

        // File handles may not be released immediately on every platform.
        // Retry with exponential backoff.
        let mut attempts = 0;
        let max_attempts = 5;

        loop {
            match std::fs::remove_dir_all(&path) {
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        return Err(Error::drop_failed(
                            name,
                            format!("{} (after {} attempts)", e, attempts),
                        ));
                    }
                    std::thread::sleep(Duration::from_millis(50 * attempts as u64));
                }
            }
        }

        tracing::info!("Dropped catalog '{}'", name);
        Ok(true)
    }

    /// List catalogs present on disk, sorted by name
    pub fn list_catalogs(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && self.catalog_exists(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_env(path: &Path) -> Result<Env> {
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(CATALOG_MAP_SIZE)
                .max_dbs(CATALOG_MAX_TABLES)
                .open(path)?
        };
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestContext;

    fn engine(ctx: &TestContext) -> Arc<LocalEngine> {
        LocalEngine::connect(ctx.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_connect_unreachable() {
        let result = LocalEngine::connect("/nonexistent/isohost/engine");
        assert!(matches!(result, Err(Error::EngineUnreachable { .. })));
    }

    #[test]
    fn test_connect_is_shared_per_address() {
        let ctx = TestContext::new();
        let a = engine(&ctx);
        let b = engine(&ctx);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_create_and_drop_catalog() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);

        engine.create_catalog("db1").unwrap();
        assert!(engine.catalog_exists("db1"));
        assert!(engine.is_catalog_open("db1"));

        assert!(engine.drop_catalog("db1", DEFAULT_RELEASE_TIMEOUT).unwrap());
        assert!(!engine.catalog_exists("db1"));
        assert!(!engine.is_catalog_open("db1"));
    }

    #[test]
    fn test_create_duplicate_catalog() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);

        engine.create_catalog("db1").unwrap();
        let result = engine.create_catalog("db1");
        assert!(matches!(result, Err(Error::CreateFailed { .. })));
    }

    #[test]
    fn test_drop_nonexistent_catalog() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);
        assert!(!engine.drop_catalog("missing", DEFAULT_RELEASE_TIMEOUT).unwrap());
    }

    #[test]
    fn test_invalid_catalog_names() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);

        assert!(engine.create_catalog("").is_err());
        assert!(engine.create_catalog("test@db").is_err());
        assert!(engine.create_catalog("test db").is_err());
        assert!(engine.create_catalog("../escape").is_err());

        assert!(engine.create_catalog("test-db").is_ok());
        assert!(engine.create_catalog("test_db2").is_ok());
    }

    #[test]
    fn test_open_session_missing_catalog() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);
        assert!(matches!(
            engine.open_session("missing"),
            Err(Error::CatalogNotFound(_))
        ));
    }

    #[test]
    fn test_list_catalogs_sorted() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);

        engine.create_catalog("zulu").unwrap();
        engine.create_catalog("alpha").unwrap();
        std::fs::create_dir_all(ctx.path().join("not_a_catalog")).unwrap();

        assert_eq!(engine.list_catalogs().unwrap(), vec!["alpha", "zulu"]);
    }

    #[test]
    fn test_catalog_reopens_after_cache_eviction() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);

        engine.create_catalog("db1").unwrap();
        {
            let session = engine.open_session("db1").unwrap();
            session.create_table("things").unwrap();
            session.put("things", "a", "1").unwrap();
        }

        // Simulate another process having created the catalog
        if let Some(env) = engine.catalogs.write().remove("db1") {
            env.prepare_for_closing().wait();
        }

        let session = engine.open_session("db1").unwrap();
        assert_eq!(session.get("things", "a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_drop_with_open_session_fails_and_keeps_data() {
        let ctx = TestContext::new();
        let engine = engine(&ctx);

        engine.create_catalog("busy").unwrap();
        let session = engine.open_session("busy").unwrap();
        session.create_table("things").unwrap();
        session.put("things", "a", "1").unwrap();

        let result = engine.drop_catalog("busy", Duration::from_millis(50));
        assert!(matches!(result, Err(Error::DropFailed { .. })));
        assert!(engine.catalog_exists("busy"));
        assert_eq!(session.get("things", "a").unwrap().as_deref(), Some("1"));

        // Once the session is gone the drop goes through
        drop(session);
        assert!(engine.drop_catalog("busy", DEFAULT_RELEASE_TIMEOUT).unwrap());
        assert!(!engine.catalog_exists("busy"));
    }

    #[test]
    fn test_idle_engines_are_unregistered() {
        let first = TestContext::new();
        let held = engine(&first);
        let base_dir = held.base_dir().to_path_buf();
        assert!(LocalEngine::is_registered(&base_dir));
        drop(held);

        let second = TestContext::new();
        let _other = engine(&second);
        assert!(!LocalEngine::is_registered(&base_dir));
    }

    #[test]
    fn test_engines_with_open_catalogs_stay_registered() {
        let first = TestContext::new();
        let base_dir = {
            let engine = engine(&first);
            engine.create_catalog("kept").unwrap();
            engine.base_dir().to_path_buf()
        };

        let second = TestContext::new();
        let _other = engine(&second);
        assert!(LocalEngine::is_registered(&base_dir));
        assert!(engine(&first).is_catalog_open("kept"));
    }
}
