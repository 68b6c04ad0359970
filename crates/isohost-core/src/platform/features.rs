//! Side-effect feature switches
//!
//! Features can be suppressed for a scope. Suppression is counted, so nested
//! or concurrent scopes compose, and it is released by dropping the
//! [`SuppressionGuard`], which also happens on unwinding and when a future
//! holding the guard is cancelled.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A platform feature with side effects outside the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Search index updates
    SearchIndexing,
    /// Logging of web farm tasks
    WebFarmTasks,
    /// Web farm synchronization
    WebFarmSync,
    /// Outgoing e-mail
    SendEmails,
    /// Object versioning
    Versioning,
    /// Background actions started by requests
    AsyncActions,
}

impl Feature {
    /// Features a test request suppresses
    pub const REQUEST_SCOPED: [Feature; 6] = [
        Feature::SearchIndexing,
        Feature::WebFarmTasks,
        Feature::WebFarmSync,
        Feature::SendEmails,
        Feature::Versioning,
        Feature::AsyncActions,
    ];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Counts active suppressions per feature
#[derive(Debug, Default)]
pub struct FeatureSwitches {
    suppressed: Mutex<HashMap<Feature, usize>>,
}

impl FeatureSwitches {
    /// All features enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `feature` is currently enabled
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.suppressed
            .lock()
            .get(&feature)
            .is_none_or(|count| *count == 0)
    }

    /// Suppress `features` until the returned guard is dropped
    pub fn suppress(this: &Arc<Self>, features: &[Feature]) -> SuppressionGuard {
        {
            let mut suppressed = this.suppressed.lock();
            for feature in features {
                *suppressed.entry(*feature).or_insert(0) += 1;
            }
        }
        SuppressionGuard {
            switches: this.clone(),
            features: features.to_vec(),
        }
    }

    fn release(&self, features: &[Feature]) {
        let mut suppressed = self.suppressed.lock();
        for feature in features {
            if let Some(count) = suppressed.get_mut(feature) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

/// Restores suppressed features on drop
#[must_use = "features are re-enabled as soon as the guard is dropped"]
pub struct SuppressionGuard {
    switches: Arc<FeatureSwitches>,
    features: Vec<Feature>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.switches.release(&self.features);
    }
}
