//! Forced access to the keys an isolated host must control

use super::{ConfigStore, keys};
use crate::{Error, Result};
use std::sync::Arc;

/// Reads and force-writes the configuration keys owned by the sequencer
///
/// Writes bypass the set-once guard of [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct ConfigurationGateway {
    store: Arc<ConfigStore>,
}

impl ConfigurationGateway {
    /// Gateway over a shared store
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// Unconditional write
    pub fn force_set(&self, key: &str, value: &str) -> Result<()> {
        self.store.force_set(key, value)
    }

    /// Inject the default salt if none is configured
    ///
    /// Returns `true` when the default was written. An operator-provided
    /// salt is never touched.
    pub fn ensure_hash_salt(&self) -> Result<bool> {
        let present = self
            .store
            .get(keys::HASH_STRING_SALT)
            .is_some_and(|v| !v.is_empty());
        if present {
            return Ok(false);
        }
        self.force_set(keys::HASH_STRING_SALT, keys::DEFAULT_HASH_SALT)?;
        tracing::debug!("Injected default {}", keys::HASH_STRING_SALT);
        Ok(true)
    }

    /// Force the platform connection string, or clear it with `None`
    pub fn set_connection_string(&self, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.force_set(keys::PLATFORM_CONNECTION, value),
            None => self
                .store
                .force_clear(keys::PLATFORM_CONNECTION)
                .map(|_| ()),
        }
    }

    /// Current platform connection string
    pub fn connection_string(&self) -> Option<String> {
        self.get(keys::PLATFORM_CONNECTION)
    }

    /// Force the load-time flags every isolated run needs
    pub fn force_isolation_flags(&self) -> Result<()> {
        self.force_set(keys::LOAD_HASHTABLES, "true")?;
        self.force_set(keys::WEB_FARM_MODE, "disabled")?;
        Ok(())
    }

    /// Configured test license key
    pub fn license_key(&self) -> Result<String> {
        match self.get(keys::TEST_LICENSE_KEY) {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::MissingLicense {
                key: keys::TEST_LICENSE_KEY.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(pairs: &[(&str, &str)]) -> ConfigurationGateway {
        ConfigurationGateway::new(Arc::new(ConfigStore::from_pairs(pairs.iter().copied())))
    }

    #[test]
    fn test_salt_defaults_when_absent() {
        let gw = gateway(&[]);
        assert!(gw.ensure_hash_salt().unwrap());
        assert_eq!(
            gw.get(keys::HASH_STRING_SALT).as_deref(),
            Some(keys::DEFAULT_HASH_SALT)
        );
        assert!(!gw.ensure_hash_salt().unwrap());
    }

    #[test]
    fn test_operator_salt_is_kept() {
        let gw = gateway(&[(keys::HASH_STRING_SALT, "operator-salt")]);
        assert!(!gw.ensure_hash_salt().unwrap());
        assert_eq!(
            gw.get(keys::HASH_STRING_SALT).as_deref(),
            Some("operator-salt")
        );
    }

    #[test]
    fn test_whitespace_operator_salt_is_kept() {
        let gw = gateway(&[(keys::HASH_STRING_SALT, "  ")]);
        assert!(!gw.ensure_hash_salt().unwrap());
        assert_eq!(gw.get(keys::HASH_STRING_SALT).as_deref(), Some("  "));
    }

    #[test]
    fn test_connection_string_bypasses_guard() {
        let store = Arc::new(ConfigStore::from_pairs([(keys::PLATFORM_CONNECTION, "old")]));
        let gw = ConfigurationGateway::new(store.clone());

        assert!(store.set_once(keys::PLATFORM_CONNECTION, "new").is_err());
        gw.set_connection_string(Some("new")).unwrap();
        assert_eq!(gw.connection_string().as_deref(), Some("new"));

        gw.set_connection_string(None).unwrap();
        assert_eq!(gw.connection_string(), None);
    }

    #[test]
    fn test_isolation_flags_forced() {
        let gw = gateway(&[(keys::LOAD_HASHTABLES, "false"), (keys::WEB_FARM_MODE, "auto")]);
        gw.force_isolation_flags().unwrap();
        assert_eq!(gw.get(keys::LOAD_HASHTABLES).as_deref(), Some("true"));
        assert_eq!(gw.get(keys::WEB_FARM_MODE).as_deref(), Some("disabled"));
    }

    #[test]
    fn test_missing_or_blank_license() {
        assert!(matches!(
            gateway(&[]).license_key(),
            Err(Error::MissingLicense { .. })
        ));
        assert!(matches!(
            gateway(&[(keys::TEST_LICENSE_KEY, "  ")]).license_key(),
            Err(Error::MissingLicense { .. })
        ));
        assert_eq!(
            gateway(&[(keys::TEST_LICENSE_KEY, "DOMAIN:localhost")])
                .license_key()
                .unwrap(),
            "DOMAIN:localhost"
        );
    }
}
