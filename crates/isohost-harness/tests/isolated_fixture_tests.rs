//! Harness over real isolated hosts

use isohost_core::config::keys;
use isohost_core::engine::LocalEngine;
use isohost_core::testing::TestContext;
use isohost_harness::{HarnessError, IsolatedFixture, Result, TestHarness, init_test_logging};
use isohost_server::ServerConfig;
use serde_json::Value;
use serial_test::serial;
use std::time::Duration;

fn fixture(engine_dir: &TestContext) -> IsolatedFixture {
    let config = ServerConfig::default()
        .with_engine_address(engine_dir.address())
        .with_setting(keys::TEST_LICENSE_KEY, "DOMAIN:localhost\nPRODUCT:Test");
    IsolatedFixture::new(config).with_artificial_delay(Duration::from_millis(10))
}

#[tokio::test]
#[serial]
async fn test_cases_get_private_catalogs() {
    init_test_logging();
    let engine_dir = TestContext::new();
    let mut harness = TestHarness::new(fixture(&engine_dir));
    harness.one_time_setup().unwrap();

    let mut catalogs = Vec::new();
    for _ in 0..2 {
        let catalog = harness
            .run_case(|host, client| {
                Box::pin(async move {
                    let site: Value = client.get_json("/site").await?;
                    assert_eq!(site["domain_name"], "localhost:51872");
                    let setting: Value = client.get_json("/settings/DefaultCulture").await?;
                    assert_eq!(setting["value"], "en-US");
                    Ok(host.catalog_name().to_string())
                })
            })
            .await
            .unwrap();
        catalogs.push(catalog);
    }

    assert_ne!(catalogs[0], catalogs[1]);
    let engine = LocalEngine::connect(&engine_dir.address()).unwrap();
    assert!(engine.list_catalogs().unwrap().is_empty());

    harness.one_time_teardown();
}

#[tokio::test]
#[serial]
async fn test_physical_path_points_at_scratch() {
    let engine_dir = TestContext::new();
    let mut harness = TestHarness::new(fixture(&engine_dir));
    harness.one_time_setup().unwrap();
    let scratch = harness.scratch_path().unwrap().to_string_lossy().to_string();

    harness.setup().await.unwrap();
    let platform = harness.host().unwrap().platform().unwrap();
    assert_eq!(platform.config().get(keys::PHYSICAL_PATH), Some(scratch));
    assert!(platform.watcher().is_running());
    assert!(!platform.watcher().is_enabled());

    harness.teardown().await.unwrap();
    assert!(harness.host().unwrap().is_released());
    harness.one_time_teardown();
}

#[tokio::test]
#[serial]
async fn test_missing_license_fails_the_case() {
    let engine_dir = TestContext::new();
    let config = ServerConfig::default().with_engine_address(engine_dir.address());
    let mut harness = TestHarness::new(IsolatedFixture::new(config));
    harness.one_time_setup().unwrap();

    let result: Result<()> = harness
        .run_case(|_host, _client| Box::pin(async { Ok(()) }))
        .await;
    let err = result.unwrap_err();
    assert!(matches!(
        err.core_error(),
        Some(isohost_core::Error::MissingLicense { .. })
    ));
    assert!(err.to_string().contains(keys::TEST_LICENSE_KEY));
    assert!(harness.host().is_none());
}

#[tokio::test]
#[serial]
async fn test_open_session_times_out_release() {
    let engine_dir = TestContext::new();
    let fixture = fixture(&engine_dir).with_release_timeout(Duration::from_millis(100));
    let mut harness = TestHarness::new(fixture);
    harness.one_time_setup().unwrap();

    harness.setup().await.unwrap();
    let host = harness.host().unwrap();
    let catalog = host.catalog_name().to_string();
    let session = host.platform().unwrap().open_catalog().unwrap();

    let err = harness.teardown().await.unwrap_err();
    assert!(matches!(err, HarnessError::ReleaseTimeout { catalog: ref name } if *name == catalog));
    harness.one_time_teardown();

    let engine = LocalEngine::connect(&engine_dir.address()).unwrap();
    assert!(engine.catalog_exists(&catalog));
    drop(session);
    assert!(engine.drop_catalog(&catalog, Duration::from_secs(1)).unwrap());
    assert!(engine.list_catalogs().unwrap().is_empty());
}
