//! Lifecycle sequencer
//!
//! Reacts to the four platform phases of one host and runs the matching
//! bootstrap or teardown step against its backing store:
//!
//! | phase | step |
//! |---|---|
//! | PreInit | check license, ensure salt, ensure store (create + install unless it exists), force connection string and flags |
//! | Init | ensure the default site and make it current, register the license |
//! | PostStart | disable the task watcher (failures are logged only) |
//! | Finalize | drop the store, clear connection string and current site |
//!
//! Phases are accepted strictly in order and each runs at most once;
//! Finalize is accepted in any state.

use crate::admin::{BackingStoreAdmin, InstallSettings};
use crate::config::ConfigurationGateway;
use crate::descriptor::ConnectionDescriptor;
use crate::platform::{
    LicenseKey, LicenseRecord, LifecycleBus, LifecycleHandler, LifecyclePhase, Platform,
    SiteContext, SiteInfo, Subscription, TaskWatcher,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Progress of a sequencer through the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SequencerState {
    /// No phase handled yet
    Created,
    /// Store ready and configuration forced
    PreInitDone,
    /// Site and license in place
    InitDone,
    /// Background work hardened
    PostStartDone,
    /// Store dropped
    Finalized,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Created => write!(f, "Created"),
            SequencerState::PreInitDone => write!(f, "PreInitDone"),
            SequencerState::InitDone => write!(f, "InitDone"),
            SequencerState::PostStartDone => write!(f, "PostStartDone"),
            SequencerState::Finalized => write!(f, "Finalized"),
        }
    }
}

struct Progress {
    state: SequencerState,
    /// PreInit got as far as touching the store, so Finalize must drop it
    store_claimed: bool,
}

/// Drives bootstrap and teardown of one isolated backing store
pub struct LifecycleSequencer {
    descriptor: ConnectionDescriptor,
    install: InstallSettings,
    site_template: SiteInfo,
    admin: Arc<dyn BackingStoreAdmin>,
    gateway: ConfigurationGateway,
    sites: Arc<SiteContext>,
    watcher: Arc<TaskWatcher>,
    progress: Mutex<Progress>,
    teardown_errors: Mutex<Vec<Error>>,
}

impl LifecycleSequencer {
    /// Sequencer for the store described by `descriptor` on `platform`
    pub fn new(
        descriptor: ConnectionDescriptor,
        platform: &Platform,
        install: InstallSettings,
    ) -> Self {
        Self {
            descriptor,
            install,
            site_template: SiteInfo::default_test_site(),
            admin: platform.admin().clone(),
            gateway: platform.gateway(),
            sites: platform.sites().clone(),
            watcher: platform.watcher().clone(),
            progress: Mutex::new(Progress {
                state: SequencerState::Created,
                store_claimed: false,
            }),
            teardown_errors: Mutex::new(Vec::new()),
        }
    }

    /// Use `site` instead of the default test site
    pub fn with_site(mut self, site: SiteInfo) -> Self {
        self.site_template = site;
        self
    }

    /// Subscribe to every phase of `bus`, one handle per phase
    pub fn subscribe(this: &Arc<Self>, bus: &LifecycleBus) -> Vec<Subscription> {
        LifecyclePhase::ALL
            .iter()
            .map(|phase| bus.subscribe(*phase, this.clone() as Arc<dyn LifecycleHandler>))
            .collect()
    }

    /// Store this sequencer manages
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        self.progress.lock().state
    }

    /// Remove and return errors recorded during Finalize
    pub fn take_teardown_errors(&self) -> Vec<Error> {
        std::mem::take(&mut *self.teardown_errors.lock())
    }

    /// Run the Finalize step unless it already ran
    ///
    /// Used when the host goes away without delivering Finalize.
    pub fn teardown(&self) {
        let mut progress = self.progress.lock();
        if progress.state == SequencerState::Finalized {
            return;
        }
        self.finalize(&mut progress);
    }

    fn pre_init(&self, progress: &mut Progress) -> Result<()> {
        // Fail before any store exists when the license is missing
        self.gateway.license_key()?;

        if self.gateway.ensure_hash_salt()? {
            tracing::info!("No hash salt configured; using the test default");
        }

        let engine = self.descriptor.engine_view();
        let catalog = self.descriptor.catalog_name();

        let exists = self.admin.exists(engine, catalog)?;
        progress.store_claimed = true;
        if exists {
            tracing::info!("Catalog '{}' exists; skipping install", catalog);
        } else {
            self.admin.create(catalog, engine)?;
            self.admin
                .install_baseline(&self.descriptor.catalog_view(), &self.install)?;
            tracing::info!("Created and installed catalog '{}'", catalog);
        }

        self.gateway
            .set_connection_string(Some(&self.descriptor.connection_string()))?;
        self.gateway.force_isolation_flags()?;
        Ok(())
    }

    fn init(&self) -> Result<()> {
        let session = self.admin.connect(&self.descriptor.catalog_view())?;

        let (site, created) = SiteInfo::ensure(&session, &self.site_template)?;
        if !created {
            tracing::debug!("Using existing site '{}'", site.site_name);
        }
        self.sites.set_current(site);

        let key = LicenseKey::parse(&self.gateway.license_key()?)?;
        LicenseRecord::register(&session, &key)?;
        Ok(())
    }

    fn post_start(&self) {
        if let Err(e) = self.watcher.disable() {
            tracing::warn!("Could not disable the task watcher: {}", e);
        }
    }

    fn finalize(&self, progress: &mut Progress) {
        let mut errors = Vec::new();

        if progress.store_claimed {
            if let Err(e) = self.admin.drop_catalog(
                self.descriptor.catalog_name(),
                self.descriptor.engine_view(),
            ) {
                tracing::error!(
                    "Failed to drop catalog '{}': {}",
                    self.descriptor.catalog_name(),
                    e
                );
                errors.push(e);
            }
        } else {
            tracing::debug!("Finalize before PreInit touched the store; nothing to drop");
        }

        if let Err(e) = self.gateway.set_connection_string(None) {
            errors.push(e);
        }
        self.sites.clear();

        progress.state = SequencerState::Finalized;
        self.teardown_errors.lock().extend(errors);
    }
}

impl LifecycleHandler for LifecycleSequencer {
    fn on_phase(&self, phase: LifecyclePhase) -> Result<()> {
        let mut progress = self.progress.lock();
        let state = progress.state;

        let (required, done) = match phase {
            LifecyclePhase::PreInit => (SequencerState::Created, SequencerState::PreInitDone),
            LifecyclePhase::Init => (SequencerState::PreInitDone, SequencerState::InitDone),
            LifecyclePhase::PostStart => {
                (SequencerState::InitDone, SequencerState::PostStartDone)
            }
            LifecyclePhase::Finalize => {
                if state != SequencerState::Finalized {
                    self.finalize(&mut progress);
                }
                return Ok(());
            }
        };

        if state >= done {
            tracing::debug!("{} already handled (state {})", phase, state);
            return Ok(());
        }
        if state != required {
            return Err(Error::OutOfOrder { phase, state });
        }

        tracing::debug!("Handling {} for '{}'", phase, self.descriptor.catalog_name());
        match phase {
            LifecyclePhase::PreInit => self.pre_init(&mut progress)?,
            LifecyclePhase::Init => self.init()?,
            LifecyclePhase::PostStart => self.post_start(),
            LifecyclePhase::Finalize => {}
        }
        progress.state = done;
        Ok(())
    }
}
