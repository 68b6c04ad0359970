//! Testing infrastructure for Isohost Core
//!
//! Centralized helpers that give every test its own engine data directory,
//! so catalogs created by parallel tests never collide.
//!
//! # Usage
//!
//! ```rust,no_run
//! use isohost_core::testing::setup_test_engine;
//!
//! #[test]
//! fn my_test() -> Result<(), isohost_core::Error> {
//!     let (admin, engine, _ctx) = setup_test_engine()?;
//!     // Use admin against engine...
//!     // TestContext removes the data directory on drop
//!     Ok(())
//! }
//! ```

mod context;
mod engine;

pub use context::TestContext;
pub use engine::{setup_test_engine, setup_test_platform};
