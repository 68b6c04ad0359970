//! Background task watcher
//!
//! Polls `<physical path>/tasks` for queued task files and processes them.
//! Isolated hosts turn it off after start so background work never races the
//! catalog drop.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Directory under the physical path that holds queued tasks
pub const TASKS_DIR: &str = "tasks";

/// Default polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls a task directory on the tokio runtime
pub struct TaskWatcher {
    poll_interval: Duration,
    enabled: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl TaskWatcher {
    /// Watcher with the given polling interval
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            enabled: Arc::new(AtomicBool::new(true)),
            processed: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    /// Start polling `<physical_path>/tasks`
    ///
    /// Must be called from within a tokio runtime. The watcher also stops
    /// when `parent` is cancelled.
    pub fn start(&self, physical_path: &Path, parent: &CancellationToken) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::WatcherUnavailable(e.to_string()))?;

        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Ok(());
        }

        let dir = physical_path.join(TASKS_DIR);
        std::fs::create_dir_all(&dir)?;

        let token = parent.child_token();
        let handle = runtime.spawn(watch(
            dir.clone(),
            self.poll_interval,
            self.enabled.clone(),
            self.processed.clone(),
            token.clone(),
        ));
        *running = Some(Running { token, handle });

        tracing::debug!("Task watcher started on {}", dir.display());
        Ok(())
    }

    /// Whether the polling task is alive
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Whether polling processes tasks
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn processing on or off without stopping the task
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Disable a running watcher
    pub fn disable(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::WatcherUnavailable(
                "task watcher is not running".to_string(),
            ));
        }
        self.set_enabled(false);
        tracing::debug!("Task watcher disabled");
        Ok(())
    }

    /// Number of task files processed so far
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Stop the polling task
    pub fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            running.token.cancel();
            tracing::debug!("Task watcher stopped");
        }
    }
}

impl Default for TaskWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Drop for TaskWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch(
    dir: PathBuf,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if !enabled.load(Ordering::SeqCst) {
            continue;
        }

        match process_pending(&dir).await {
            Ok(0) => {}
            Ok(n) => {
                processed.fetch_add(n, Ordering::SeqCst);
                tracing::debug!("Processed {} task(s) from {}", n, dir.display());
            }
            Err(e) => tracing::warn!("Task watcher failed to poll {}: {}", dir.display(), e),
        }
    }
}

async fn process_pending(dir: &Path) -> std::io::Result<u64> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "task") {
            tokio::fs::remove_file(&path).await?;
            count += 1;
        }
    }
    Ok(count)
}
