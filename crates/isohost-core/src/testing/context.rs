//! TestContext - Manages a scratch directory for the duration of a test
//!
//! Used both as the engine data directory in unit tests and as the
//! per-fixture physical path of the test harness.

use crate::Result;
use std::any::Any;
use std::path::Path;
use tempfile::TempDir;

/// Context for managing test resources and lifecycle
///
/// The scratch directory and every registered resource are released when
/// the context is dropped, resources first.
///
/// # Example
///
/// ```rust,no_run
/// use isohost_core::testing::TestContext;
///
/// let ctx = TestContext::new();
/// let scratch = ctx.path();
/// ```
pub struct TestContext {
    /// Resources released before the directory, in reverse order
    resources: Vec<Box<dyn Any + Send>>,
    /// Temporary directory for this test
    temp_dir: TempDir,
}

impl TestContext {
    /// Create a new TestContext with a unique temporary directory
    ///
    /// Panics if the directory cannot be created; use [`TestContext::try_new`]
    /// outside of tests.
    pub fn new() -> Self {
        Self::try_new().expect("Failed to create temporary directory")
    }

    /// Create a new TestContext, reporting I/O failures
    pub fn try_new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("isohost-").tempdir()?;

        // The directory must exist before an engine is pointed at it
        std::fs::create_dir_all(temp_dir.path())?;

        Ok(Self {
            resources: Vec::new(),
            temp_dir,
        })
    }

    /// Path to the scratch directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Scratch path as a string, the form engine addresses take
    pub fn address(&self) -> String {
        self.temp_dir.path().to_string_lossy().to_string()
    }

    /// Register an additional resource for cleanup
    pub fn register<T: Any + Send>(&mut self, resource: T) {
        self.resources.push(Box::new(resource));
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        while let Some(resource) = self.resources.pop() {
            drop(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_context_creates_directory() {
        let ctx = TestContext::new();
        assert!(ctx.path().is_dir());
        assert_eq!(ctx.address(), ctx.path().to_string_lossy());
    }

    #[test]
    fn test_context_cleanup_on_drop() {
        let path = {
            let ctx = TestContext::new();
            fs::write(ctx.path().join("marker"), "x").unwrap();
            ctx.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_registered_resources_are_dropped() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        {
            let mut ctx = TestContext::new();
            ctx.register(Flag(dropped.clone()));
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
