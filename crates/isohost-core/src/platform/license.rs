//! License keys and registered license records
//!
//! A license key is a text blob of `FIELD:value` pairs separated by newlines
//! or `;`. `DOMAIN` is required; `PRODUCT`, `EXPIRATION` and `SERIAL` are
//! optional. Unknown fields are ignored.

use crate::engine::CatalogSession;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Table holding license records keyed by domain
pub const LICENSES_TABLE: &str = "licenses";

/// A parsed license key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseKey {
    /// Licensed domain
    pub domain: String,
    /// Product edition
    pub product: Option<String>,
    /// Expiration date
    pub expiration: Option<NaiveDate>,
    /// Serial number
    pub serial: Option<String>,
    raw: String,
}

impl LicenseKey {
    /// Parse a license key blob
    pub fn parse(raw: &str) -> Result<Self> {
        let mut domain = None;
        let mut product = None;
        let mut expiration = None;
        let mut serial = None;

        for part in raw.split(['\n', ';']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (field, value) = part
                .split_once(':')
                .ok_or_else(|| Error::InvalidLicense(format!("expected FIELD:value, got '{}'", part)))?;
            let value = value.trim();

            match field.trim().to_ascii_uppercase().as_str() {
                "DOMAIN" => domain = Some(value.to_string()),
                "PRODUCT" => product = Some(value.to_string()),
                "SERIAL" => serial = Some(value.to_string()),
                "EXPIRATION" => {
                    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
                        Error::InvalidLicense(format!("bad EXPIRATION '{}': {}", value, e))
                    })?;
                    expiration = Some(date);
                }
                _ => {}
            }
        }

        let domain = domain
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::InvalidLicense("DOMAIN is required".to_string()))?;

        Ok(Self {
            domain,
            product,
            expiration,
            serial,
            raw: raw.to_string(),
        })
    }

    /// The key text as configured
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// A license registered in a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Licensed domain
    pub domain: String,
    /// Product edition
    pub product: Option<String>,
    /// Expiration date
    pub expiration: Option<NaiveDate>,
    /// Full key text
    pub key: String,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}

impl LicenseRecord {
    /// Record for a parsed key
    pub fn from_key(key: &LicenseKey) -> Self {
        Self {
            domain: key.domain.clone(),
            product: key.product.clone(),
            expiration: key.expiration,
            key: key.raw().to_string(),
            registered_at: Utc::now(),
        }
    }

    /// Look up the record for `domain`
    pub fn get(session: &CatalogSession, domain: &str) -> Result<Option<Self>> {
        session.get_record(LICENSES_TABLE, domain)
    }

    /// Register `key` unless its domain already has a record
    ///
    /// Returns `true` when a record was written.
    pub fn register(session: &CatalogSession, key: &LicenseKey) -> Result<bool> {
        if Self::get(session, &key.domain)?.is_some() {
            return Ok(false);
        }
        session.put_record(LICENSES_TABLE, &key.domain, &Self::from_key(key))?;
        tracing::info!("Registered license for domain '{}'", key.domain);
        Ok(true)
    }
}
