//! Test helpers for engines and platforms
//!
//! Each helper returns its [`TestContext`]; keep it alive for the duration
//! of the test, the engine data directory goes away with it.

use super::context::TestContext;
use crate::Result;
use crate::admin::EngineAdmin;
use crate::config::{ConfigStore, keys};
use crate::descriptor::EngineDescriptor;
use crate::platform::Platform;
use std::sync::Arc;

/// Admin plus a descriptor for an engine rooted in a fresh scratch directory
///
/// # Example
///
/// ```rust,no_run
/// use isohost_core::admin::BackingStoreAdmin;
/// use isohost_core::testing::setup_test_engine;
///
/// let (admin, engine, _ctx) = setup_test_engine()?;
/// admin.create("ISO_TEST_example", &engine)?;
/// # Ok::<(), isohost_core::Error>(())
/// ```
pub fn setup_test_engine() -> Result<(EngineAdmin, EngineDescriptor, TestContext)> {
    let ctx = TestContext::try_new()?;
    let engine = EngineDescriptor::new(ctx.address());
    Ok((EngineAdmin::new(), engine, ctx))
}

/// Platform whose configuration holds `pairs` plus a physical path pointing
/// at the scratch directory, which also serves as the engine address
pub fn setup_test_platform(
    pairs: &[(&str, &str)],
) -> Result<(Platform, EngineDescriptor, TestContext)> {
    let ctx = TestContext::try_new()?;
    let engine = EngineDescriptor::new(ctx.address());

    let config = ConfigStore::from_pairs(pairs.iter().copied());
    if config.get(keys::PHYSICAL_PATH).is_none() {
        config.force_set(keys::PHYSICAL_PATH, &ctx.address())?;
    }

    let platform = Platform::new(config, Arc::new(EngineAdmin::new()));
    Ok((platform, engine, ctx))
}
