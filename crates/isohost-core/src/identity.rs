//! Per-run resource identity
//!
//! Every isolated host gets a fresh UUID; the backing-store catalog name is
//! derived from it so two live hosts never address the same catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix used for catalog names when none is configured
pub const DEFAULT_CATALOG_PREFIX: &str = "ISO_TEST_";

/// Unique identity of one isolated host and the name of its catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    id: Uuid,
    derived_name: String,
}

impl ResourceIdentity {
    /// Generate a fresh identity with the default prefix
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_CATALOG_PREFIX)
    }

    /// Generate a fresh identity whose catalog name starts with `prefix`
    pub fn with_prefix(prefix: &str) -> Self {
        Self::from_parts(Uuid::new_v4(), prefix)
    }

    /// Rebuild an identity from a known id, e.g. to point at an existing store
    pub fn from_parts(id: Uuid, prefix: &str) -> Self {
        Self {
            id,
            derived_name: format!("{}{}", prefix, id),
        }
    }

    /// The generated identifier
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Catalog name derived from the identifier
    pub fn derived_name(&self) -> &str {
        &self.derived_name
    }
}

impl Default for ResourceIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.derived_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_derived_name_is_prefix_plus_id() {
        let identity = ResourceIdentity::new();
        assert_eq!(
            identity.derived_name(),
            format!("ISO_TEST_{}", identity.id())
        );
    }

    #[test]
    fn test_identities_are_distinct() {
        let names: HashSet<String> = (0..256)
            .map(|_| ResourceIdentity::new().derived_name().to_string())
            .collect();
        assert_eq!(names.len(), 256);
    }

    #[test]
    fn test_from_parts_is_deterministic() {
        let id = Uuid::new_v4();
        let a = ResourceIdentity::from_parts(id, "X_");
        let b = ResourceIdentity::from_parts(id, "X_");
        assert_eq!(a, b);
        assert!(a.derived_name().starts_with("X_"));
    }
}
