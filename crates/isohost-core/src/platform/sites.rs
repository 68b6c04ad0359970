//! Site records and the current-site context

use crate::Result;
use crate::engine::CatalogSession;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Table holding site records keyed by site name
pub const SITES_TABLE: &str = "sites";

/// Code name of the site every isolated host gets
pub const DEFAULT_SITE_NAME: &str = "NewSite";

/// Whether a site serves requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    /// Serving
    Running,
    /// Not serving
    Stopped,
}

/// A site (tenant) record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// Code name, unique per catalog
    pub site_name: String,
    /// Human readable name
    pub display_name: String,
    /// Run status
    pub status: SiteStatus,
    /// Domain the site answers on
    pub domain_name: String,
    /// Base URL of the presentation application
    pub presentation_url: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl SiteInfo {
    /// Site record used by isolated integration-test hosts
    pub fn default_test_site() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.to_string(),
            display_name: "Isolated Integration Test Site".to_string(),
            status: SiteStatus::Running,
            domain_name: "localhost:51872".to_string(),
            presentation_url: "http://localhost/".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Look up a site by code name
    pub fn get(session: &CatalogSession, site_name: &str) -> Result<Option<Self>> {
        session.get_record(SITES_TABLE, site_name)
    }

    /// Insert or replace a site
    pub fn save(&self, session: &CatalogSession) -> Result<()> {
        session.put_record(SITES_TABLE, &self.site_name, self)
    }

    /// Return the site named like `template`, creating it from `template` if
    /// absent. The flag is `true` when the site was created.
    pub fn ensure(session: &CatalogSession, template: &SiteInfo) -> Result<(Self, bool)> {
        if let Some(existing) = Self::get(session, &template.site_name)? {
            return Ok((existing, false));
        }
        template.save(session)?;
        tracing::info!("Created site '{}'", template.site_name);
        Ok((template.clone(), true))
    }
}

/// The site the platform currently serves
#[derive(Debug, Default)]
pub struct SiteContext {
    current: RwLock<Option<SiteInfo>>,
}

impl SiteContext {
    /// Context with no current site
    pub fn new() -> Self {
        Self::default()
    }

    /// Current site, if any
    pub fn current(&self) -> Option<SiteInfo> {
        self.current.read().clone()
    }

    /// Make `site` current
    pub fn set_current(&self, site: SiteInfo) {
        *self.current.write() = Some(site);
    }

    /// Forget the current site
    pub fn clear(&self) -> Option<SiteInfo> {
        self.current.write().take()
    }
}
