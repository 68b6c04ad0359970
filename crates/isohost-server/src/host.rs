//! Generic platform host
//!
//! [`PlatformHost`] serves HTTP for one [`Platform`] and fires its lifecycle
//! around the listener:
//!
//! ```text
//! start: PreInit → Init → watcher → bind + serve → PostStart
//! stop:  drain (bounded) → watcher stop → Finalize
//! ```
//!
//! Phase handlers create, install and drop stores synchronously, so phases
//! are fired on the blocking pool.

use crate::api;
use crate::config::ServerConfig;
use crate::error::{HostError, Result};
use crate::middleware::feature_scope;
use async_trait::async_trait;
use axum::Router;
use isohost_core::admin::{BackingStoreAdmin, EngineAdmin};
use isohost_core::platform::{LifecyclePhase, Platform};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// A startable, stoppable host
#[async_trait]
pub trait Host: Send + Sync {
    /// Start serving; fails if `cancel` fires first
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Stop serving; when `cancel` fires the server is aborted
    async fn stop(&self, cancel: CancellationToken) -> Result<()>;

    /// Address the listener is bound to, once started
    fn local_addr(&self) -> Option<SocketAddr>;
}

/// Builds a [`PlatformHost`]
pub struct HostBuilder {
    config: ServerConfig,
    admin: Arc<dyn BackingStoreAdmin>,
    routes: Option<Router<Platform>>,
}

impl HostBuilder {
    /// Builder for `config` using the local engine admin
    pub fn new(config: ServerConfig) -> Self {
        let admin = EngineAdmin::new().with_release_timeout(config.release_timeout());
        Self {
            config,
            admin: Arc::new(admin),
            routes: None,
        }
    }

    /// Administer stores through `admin`
    pub fn with_admin(mut self, admin: Arc<dyn BackingStoreAdmin>) -> Self {
        self.admin = admin;
        self
    }

    /// Serve `routes` instead of the sample API
    pub fn with_routes(mut self, routes: Router<Platform>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Set a platform configuration value
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_setting(key, value);
        self
    }

    /// Configuration the host will be built from
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the host; nothing runs until [`Host::start`]
    pub fn build(self) -> PlatformHost {
        let platform = Platform::new(self.config.config_store(), self.admin);
        let routes = self.routes.unwrap_or_else(api::router);
        let router = routes
            .layer(axum::middleware::from_fn_with_state(
                platform.features().clone(),
                feature_scope,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(platform.clone());

        PlatformHost {
            platform,
            addr: self.config.host.addr,
            shutdown_timeout: self.config.shutdown_timeout(),
            router,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            running: Mutex::new(None),
            bound: Mutex::new(None),
        }
    }
}

struct RunningServer {
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

/// HTTP host for one platform
pub struct PlatformHost {
    platform: Platform,
    addr: SocketAddr,
    shutdown_timeout: Duration,
    router: Router,
    started: AtomicBool,
    /// Parent of the server and watcher tokens
    shutdown: CancellationToken,
    running: Mutex<Option<RunningServer>>,
    bound: Mutex<Option<SocketAddr>>,
}

impl PlatformHost {
    /// Platform served by this host
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Whether the server task is running
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    async fn fire(&self, phase: LifecyclePhase) -> isohost_core::Result<()> {
        let lifecycle = self.platform.lifecycle().clone();
        tokio::task::spawn_blocking(move || lifecycle.fire(phase))
            .await
            .map_err(|e| isohost_core::Error::internal(format!("{} handlers failed: {}", phase, e)))?
    }

    /// Fire Finalize after a failed start; the start error wins
    async fn abort_start(&self, err: HostError) -> HostError {
        self.platform.watcher().stop();
        if let Err(e) = self.fire(LifecyclePhase::Finalize).await {
            tracing::warn!("Finalize after failed start also failed: {}", e);
        }
        err
    }

    async fn bind(&self, cancel: &CancellationToken) -> Result<TcpListener> {
        tokio::select! {
            listener = TcpListener::bind(self.addr) => Ok(listener?),
            _ = cancel.cancelled() => Err(HostError::Cancelled),
        }
    }
}

#[async_trait]
impl Host for PlatformHost {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyStarted);
        }
        if cancel.is_cancelled() {
            return Err(self.abort_start(HostError::Cancelled).await);
        }

        for phase in [LifecyclePhase::PreInit, LifecyclePhase::Init] {
            if let Err(e) = self.fire(phase).await {
                tracing::error!("{} failed: {}", phase, e);
                return Err(self.abort_start(e.into()).await);
            }
        }

        if let Some(path) = self.platform.physical_path() {
            if let Err(e) = self.platform.watcher().start(&path, &self.shutdown) {
                tracing::warn!("Task watcher not started: {}", e);
            }
        }

        let listener = match self.bind(&cancel).await {
            Ok(listener) => listener,
            Err(e) => return Err(self.abort_start(e).await),
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => return Err(self.abort_start(e.into()).await),
        };

        let token = self.shutdown.child_token();
        let graceful = token.clone();
        let app = self.router.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .await
        });

        *self.bound.lock() = Some(local_addr);
        *self.running.lock() = Some(RunningServer {
            shutdown: token,
            task,
        });
        tracing::info!("Host listening on http://{}", local_addr);

        if let Err(e) = self.fire(LifecyclePhase::PostStart).await {
            tracing::warn!("PostStart handler failed: {}", e);
        }
        Ok(())
    }

    async fn stop(&self, cancel: CancellationToken) -> Result<()> {
        let running = self.running.lock().take();
        let mut timed_out = false;

        if let Some(RunningServer { shutdown, mut task }) = running {
            shutdown.cancel();
            tokio::select! {
                joined = &mut task => match joined {
                    Ok(Ok(())) => tracing::debug!("Server drained"),
                    Ok(Err(e)) => tracing::warn!("Server exited with error: {}", e),
                    Err(e) => tracing::warn!("Server task failed: {}", e),
                },
                _ = cancel.cancelled() => {
                    task.abort();
                    timed_out = true;
                }
                _ = tokio::time::sleep(self.shutdown_timeout) => {
                    task.abort();
                    timed_out = true;
                }
            }
        }

        self.platform.watcher().stop();
        if let Err(e) = self.fire(LifecyclePhase::Finalize).await {
            tracing::warn!("Finalize failed: {}", e);
        }

        if timed_out {
            tracing::warn!("Host stop timed out; server aborted");
            return Err(HostError::StopTimedOut);
        }
        tracing::info!("Host stopped");
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }
}

impl Drop for PlatformHost {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(running) = self.running.get_mut().take() {
            running.task.abort();
        }
    }
}
