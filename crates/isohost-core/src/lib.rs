//! Isohost Core - Isolated backing stores for integration-test hosts
//!
//! This crate provides everything an integration-test host needs to run
//! against a private, disposable database:
//! - Per-run resource identities and connection descriptors
//! - A local catalog engine (one LMDB environment per catalog)
//! - Backing-store administration and baseline install scripts
//! - A configuration store with a forced-write gateway
//! - The platform services (lifecycle bus, sites, licenses, feature
//!   switches, background task watcher)
//! - The lifecycle sequencer that bootstraps and tears down a store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │         LifecycleSequencer                   │
//! │  (PreInit → Init → PostStart → Finalize)    │
//! └──────────────┬───────────────┬──────────────┘
//!                │               │
//! ┌──────────────┴──────┐ ┌──────┴──────────────┐
//! │  BackingStoreAdmin  │ │ ConfigurationGateway │
//! │ (exists/create/     │ │  (forced writes)     │
//! │  install/drop)      │ └──────────────────────┘
//! └──────────────┬──────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │      LocalEngine (catalog per LMDB env)      │
//! └─────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod identity;
pub mod platform;
pub mod sequencer;
pub mod testing;

pub use error::{Error, Result};
