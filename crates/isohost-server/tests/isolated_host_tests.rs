//! End-to-end tests of isolated hosts over HTTP

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use isohost_core::admin::{BackingStoreAdmin, EngineAdmin, InstallLog, InstallSettings};
use isohost_core::config::keys;
use isohost_core::descriptor::{CatalogDescriptor, EngineDescriptor};
use isohost_core::engine::{CatalogSession, LocalEngine};
use isohost_core::identity::ResourceIdentity;
use isohost_core::platform::{DEFAULT_SITE_NAME, Feature, Platform, SITES_TABLE};
use isohost_core::sequencer::SequencerState;
use isohost_core::testing::TestContext;
use isohost_server::{Host, HostBuilder, HostError, IsolatedHost, IsolationSettings, ServerConfig};
use serde_json::{Value, json};
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

const LICENSE: &str = "DOMAIN:localhost\nPRODUCT:Test";

fn config(ctx: &TestContext) -> ServerConfig {
    ServerConfig::default()
        .with_engine_address(ctx.address())
        .with_setting(keys::TEST_LICENSE_KEY, LICENSE)
}

fn engine(ctx: &TestContext) -> Arc<LocalEngine> {
    LocalEngine::connect(&ctx.address()).unwrap()
}

async fn get_json(host: &IsolatedHost, path: &str) -> (u16, Value) {
    let url = format!("{}{}", host.base_url().unwrap(), path);
    let response = reqwest::get(&url).await.unwrap();
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
#[serial]
async fn test_end_to_end_lifecycle() {
    let ctx = TestContext::new();
    let mut host = IsolatedHost::start_new(
        HostBuilder::new(config(&ctx)),
        IsolationSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(host.sequencer_state(), SequencerState::PostStartDone);
    assert!(engine(&ctx).catalog_exists(host.catalog_name()));

    let (status, site) = get_json(&host, "/site").await;
    assert_eq!(status, 200);
    assert_eq!(site["site_name"], DEFAULT_SITE_NAME);
    assert_eq!(site["domain_name"], "localhost:51872");

    let (status, setting) = get_json(&host, "/settings/DefaultCulture").await;
    assert_eq!(status, 200);
    assert_eq!(setting["value"], "en-US");

    let (_, health) = get_json(&host, "/health").await;
    assert_eq!(health["catalog"], host.catalog_name());

    host.stop(CancellationToken::new()).await.unwrap();
    assert!(host.is_released());
    assert!(!engine(&ctx).catalog_exists(host.catalog_name()));

    let report = host.dispose();
    assert!(report.finalized_by_host);
    assert!(report.is_clean());
}

#[tokio::test]
#[serial]
async fn test_features_suppressed_during_requests() {
    let ctx = TestContext::new();
    let mut host = IsolatedHost::start_new(
        HostBuilder::new(config(&ctx)),
        IsolationSettings::default(),
    )
    .await
    .unwrap();

    let (status, features) = get_json(&host, "/features").await;
    assert_eq!(status, 200);
    let features = features.as_object().unwrap();
    assert!(!features.is_empty());
    assert!(features.values().all(|enabled| enabled.as_bool() == Some(false)));

    host.stop(CancellationToken::new()).await.unwrap();
    host.dispose();
}

#[tokio::test]
#[serial]
async fn test_missing_license_fails_before_store_exists() {
    let ctx = TestContext::new();
    let identity = ResourceIdentity::new();
    let config = ServerConfig::default().with_engine_address(ctx.address());

    let result = IsolatedHost::start_new(
        HostBuilder::new(config),
        IsolationSettings::default().with_identity(identity.clone()),
    )
    .await;

    let err = match result {
        Ok(_) => panic!("start must fail without a license"),
        Err(e) => e,
    };
    assert!(matches!(
        err,
        HostError::Lifecycle(isohost_core::Error::MissingLicense { .. })
    ));
    assert!(err.to_string().contains(keys::TEST_LICENSE_KEY));
    assert!(!engine(&ctx).catalog_exists(identity.derived_name()));
}

#[tokio::test]
#[serial]
async fn test_repeated_cycles_leave_no_store_behind() {
    let ctx = TestContext::new();
    let mut names = Vec::new();

    for _ in 0..3 {
        let mut host = IsolatedHost::start_new(
            HostBuilder::new(config(&ctx)),
            IsolationSettings::default(),
        )
        .await
        .unwrap();
        names.push(host.catalog_name().to_string());

        host.stop(CancellationToken::new()).await.unwrap();
        assert!(host.dispose().is_clean());
    }

    names.sort();
    names.dedup();
    assert_eq!(names.len(), 3);
    assert!(engine(&ctx).list_catalogs().unwrap().is_empty());
}

#[derive(Default)]
struct CountingAdmin {
    inner: EngineAdmin,
    creates: AtomicUsize,
    installs: AtomicUsize,
}

impl BackingStoreAdmin for CountingAdmin {
    fn exists(&self, engine: &EngineDescriptor, catalog: &str) -> isohost_core::Result<bool> {
        self.inner.exists(engine, catalog)
    }

    fn create(&self, catalog: &str, engine: &EngineDescriptor) -> isohost_core::Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(catalog, engine)
    }

    fn install_baseline(
        &self,
        target: &CatalogDescriptor,
        settings: &InstallSettings,
    ) -> isohost_core::Result<InstallLog> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.inner.install_baseline(target, settings)
    }

    fn drop_catalog(&self, catalog: &str, engine: &EngineDescriptor) -> isohost_core::Result<()> {
        self.inner.drop_catalog(catalog, engine)
    }

    fn connect(&self, target: &CatalogDescriptor) -> isohost_core::Result<CatalogSession> {
        self.inner.connect(target)
    }
}

#[tokio::test]
#[serial]
async fn test_existing_store_skips_install() {
    let ctx = TestContext::new();
    let identity = ResourceIdentity::new();

    // Prepare the store as a previous host would have left it
    let engine_descriptor = EngineDescriptor::new(ctx.address());
    let admin = EngineAdmin::new();
    admin
        .create(identity.derived_name(), &engine_descriptor)
        .unwrap();
    admin
        .install_baseline(
            &engine_descriptor.with_catalog(identity.derived_name()),
            &InstallSettings::default(),
        )
        .unwrap();

    let counting = Arc::new(CountingAdmin::default());
    let mut host = IsolatedHost::start_new(
        HostBuilder::new(config(&ctx)).with_admin(counting.clone()),
        IsolationSettings::default().with_identity(identity.clone()),
    )
    .await
    .unwrap();

    assert_eq!(counting.creates.load(Ordering::SeqCst), 0);
    assert_eq!(counting.installs.load(Ordering::SeqCst), 0);
    assert_eq!(
        host.platform()
            .unwrap()
            .config()
            .get(keys::PLATFORM_CONNECTION),
        Some(host.connection_string())
    );

    let (status, _) = get_json(&host, "/site").await;
    assert_eq!(status, 200);

    host.stop(CancellationToken::new()).await.unwrap();
    host.dispose();
    assert!(!engine(&ctx).catalog_exists(identity.derived_name()));
}

#[tokio::test]
#[serial]
async fn test_dropping_running_host_releases_store() {
    let ctx = TestContext::new();
    let name = {
        let host = IsolatedHost::start_new(
            HostBuilder::new(config(&ctx)),
            IsolationSettings::default(),
        )
        .await
        .unwrap();
        host.catalog_name().to_string()
    };
    assert!(!engine(&ctx).catalog_exists(&name));
}

async fn enabled_features(State(platform): State<Platform>) -> Json<Value> {
    let enabled: Vec<String> = Feature::REQUEST_SCOPED
        .iter()
        .filter(|f| platform.features().is_enabled(**f))
        .map(|f| f.to_string())
        .collect();
    Json(json!({ "enabled": enabled }))
}

#[tokio::test]
#[serial]
async fn test_custom_routes_run_with_features_suppressed() {
    let ctx = TestContext::new();
    let routes = Router::new()
        .route("/", get(|| async { "custom index" }))
        .route("/test", get(enabled_features));
    let mut host = IsolatedHost::start_new(
        HostBuilder::new(config(&ctx)).with_routes(routes),
        IsolationSettings::default(),
    )
    .await
    .unwrap();

    let index = reqwest::get(host.base_url().unwrap()).await.unwrap();
    assert_eq!(index.status().as_u16(), 200);
    assert_eq!(index.text().await.unwrap(), "custom index");

    let (status, body) = get_json(&host, "/test").await;
    assert_eq!(status, 200);
    assert_eq!(body["enabled"], json!([]));

    // The sample API is not mounted alongside custom routes
    let (status, _) = get_json(&host, "/site").await;
    assert_eq!(status, 404);

    let features = host.platform().unwrap().features().clone();
    assert!(Feature::REQUEST_SCOPED.iter().all(|f| features.is_enabled(*f)));

    host.stop(CancellationToken::new()).await.unwrap();
    assert!(host.dispose().is_clean());
}

#[tokio::test]
#[serial]
async fn test_cancelled_stop_still_releases_store() {
    let ctx = TestContext::new();
    let mut host = IsolatedHost::start_new(
        HostBuilder::new(config(&ctx)),
        IsolationSettings::default(),
    )
    .await
    .unwrap();
    let name = host.catalog_name().to_string();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = host.stop(cancel).await.unwrap_err();
    assert!(matches!(err, HostError::StopTimedOut));

    assert!(!engine(&ctx).catalog_exists(&name));
    assert!(host.is_released());
    assert!(host.dispose().finalized_by_host);
}

#[tokio::test]
#[serial]
async fn test_open_session_blocks_drop_and_keeps_store() {
    let ctx = TestContext::new();
    let mut config = config(&ctx);
    config.engine.release_timeout_ms = 100;
    let mut host = IsolatedHost::start_new(HostBuilder::new(config), IsolationSettings::default())
        .await
        .unwrap();
    let name = host.catalog_name().to_string();
    let session = host.platform().unwrap().open_catalog().unwrap();

    host.stop(CancellationToken::new()).await.unwrap();
    assert!(engine(&ctx).catalog_exists(&name));

    let report = host.dispose();
    assert!(report.finalized_by_host);
    assert!(matches!(
        report.teardown_errors.as_slice(),
        [isohost_core::Error::DropFailed { .. }]
    ));

    // The store is still usable through the open session
    assert!(session.has_table(SITES_TABLE).unwrap());
    drop(session);

    EngineAdmin::new()
        .drop_catalog(&name, &EngineDescriptor::new(ctx.address()))
        .unwrap();
    assert!(!engine(&ctx).catalog_exists(&name));
}
