//! Middleware modules

pub mod feature_scope;

pub use feature_scope::feature_scope;
