//! Platform configuration store
//!
//! A flat string key/value store. Keys are `:`-separated section paths such
//! as `ConnectionStrings:PlatformConnection`. Application code writes through
//! the guarded [`ConfigStore::set_once`]; the lifecycle sequencer bypasses the
//! guard through [`ConfigurationGateway`].

mod gateway;

pub use gateway::ConfigurationGateway;

use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Well-known configuration keys
pub mod keys {
    /// Secret salt used for hashing
    pub const HASH_STRING_SALT: &str = "HashStringSalt";
    /// Section holding connection strings
    pub const CONNECTION_STRINGS_SECTION: &str = "ConnectionStrings";
    /// Connection string of the platform database
    pub const PLATFORM_CONNECTION: &str = "ConnectionStrings:PlatformConnection";
    /// License key used by test hosts
    pub const TEST_LICENSE_KEY: &str = "TestLicenseKey";
    /// Load lookup tables eagerly
    pub const LOAD_HASHTABLES: &str = "LoadHashtables";
    /// Web farm synchronization mode
    pub const WEB_FARM_MODE: &str = "WebFarmMode";
    /// Physical path of the hosted web application
    pub const PHYSICAL_PATH: &str = "WebApplicationPhysicalPath";

    /// Salt injected when none is configured
    pub const DEFAULT_HASH_SALT: &str = "TestTestTestTest";
}

/// Thread-safe configuration store
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl ConfigStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `pairs`
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Guarded write used by application code
    ///
    /// Refuses empty values and refuses to overwrite a non-empty value.
    pub fn set_once(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        if value.is_empty() {
            return Err(Error::config_write(key, "empty values are not accepted"));
        }

        let mut values = self.values.write();
        if values.get(key).is_some_and(|v| !v.is_empty()) {
            return Err(Error::config_write(key, "value is already set"));
        }
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Unconditional write
    pub fn force_set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Remove a key, returning the previous value
    pub fn force_clear(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.values.write().remove(key))
    }

    /// All keys under a section, with the section prefix stripped
    pub fn section(&self, section: &str) -> BTreeMap<String, String> {
        let prefix = format!("{}:", section);
        self.values
            .read()
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }
}

/// A key is non-empty and has no empty or whitespace-padded segments
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::config_write(key, "key is empty"));
    }
    for segment in key.split(':') {
        if segment.is_empty() || segment.trim() != segment {
            return Err(Error::config_write(key, "malformed key"));
        }
    }
    Ok(())
}
