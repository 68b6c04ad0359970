//! Fixture-scoped test harness
//!
//! One [`TestHarness`] per fixture run owns at most one host/client pair:
//!
//! ```text
//! one_time_setup → (setup → case → teardown)* → one_time_teardown
//! ```
//!
//! The previous pair is disposed at the start of every case but the first,
//! so a case can still inspect its host after teardown stopped it.

use crate::error::{HarnessError, Result};
use crate::fixture::Fixture;
use futures::FutureExt;
use futures::future::BoxFuture;
use isohost_core::testing::TestContext;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Sequences host/client pairs across the cases of one fixture
pub struct TestHarness<F: Fixture> {
    fixture: F,
    scratch: Option<TestContext>,
    host: Option<F::Host>,
    client: Option<F::Client>,
    is_first_test: bool,
}

impl<F: Fixture> TestHarness<F> {
    /// Harness over `fixture`; nothing is created until setup
    pub fn new(fixture: F) -> Self {
        Self {
            fixture,
            scratch: None,
            host: None,
            client: None,
            is_first_test: true,
        }
    }

    /// Fixture driving this harness
    pub fn fixture(&self) -> &F {
        &self.fixture
    }

    /// Per-fixture scratch directory, after one-time setup
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TestContext::path)
    }

    /// Host of the current case
    pub fn host(&self) -> Option<&F::Host> {
        self.host.as_ref()
    }

    /// Client of the current case
    pub fn client(&self) -> Option<&F::Client> {
        self.client.as_ref()
    }

    /// Create the per-fixture scratch directory
    ///
    /// A failure here aborts the whole fixture.
    pub fn one_time_setup(&mut self) -> Result<()> {
        if self.scratch.is_none() {
            let scratch = TestContext::try_new()?;
            tracing::debug!("Fixture scratch directory {:?}", scratch.path());
            self.scratch = Some(scratch);
        }
        Ok(())
    }

    /// Replace the host/client pair for the next case
    pub async fn setup(&mut self) -> Result<()> {
        let scratch = self
            .scratch
            .as_ref()
            .map(|ctx| ctx.path().to_path_buf())
            .ok_or(HarnessError::FixtureNotStarted)?;

        if !self.is_first_test {
            self.dispose_pair();
        }
        self.is_first_test = false;

        let host = self.fixture.create_host(&scratch).await?;
        let client = match self.fixture.create_client(&host) {
            Ok(client) => client,
            Err(e) => {
                self.fixture.dispose_host(host);
                return Err(e);
            }
        };

        self.host = Some(host);
        self.client = Some(client);
        Ok(())
    }

    /// Stop the current host, wait for its release, then pause
    ///
    /// The stop is cancelled once the fixture's stop timeout elapses; the
    /// release barrier and the pause still run.
    pub async fn teardown(&mut self) -> Result<()> {
        let host = self.host.as_ref().ok_or(HarnessError::NotSetUp)?;

        let cancel = CancellationToken::new();
        let timer = tokio::spawn({
            let cancel = cancel.clone();
            let timeout = self.fixture.stop_timeout();
            async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            }
        });
        let stopped = self.fixture.stop_host(host, cancel).await;
        timer.abort();

        if let Err(e) = &stopped {
            tracing::warn!("Host stop failed: {}", e);
        }
        let released = self.fixture.wait_for_release(host).await;

        let delay = self.fixture.artificial_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        stopped.and(released)
    }

    /// Dispose the last pair and the scratch directory
    pub fn one_time_teardown(&mut self) {
        self.dispose_pair();
        self.scratch = None;
        self.is_first_test = true;
    }

    /// Run one case: setup, `body`, teardown
    ///
    /// Teardown runs when the body fails or panics; a panic resumes after it.
    /// A body error wins over a teardown error.
    pub async fn run_case<T, B>(&mut self, body: B) -> Result<T>
    where
        B: for<'a> FnOnce(&'a F::Host, &'a F::Client) -> BoxFuture<'a, Result<T>>,
    {
        self.setup().await?;

        let outcome = match (&self.host, &self.client) {
            (Some(host), Some(client)) => {
                AssertUnwindSafe(async move { body(host, client).await })
                    .catch_unwind()
                    .await
            }
            _ => Ok(Err(HarnessError::NotSetUp)),
        };

        let teardown = self.teardown().await;
        match outcome {
            Ok(Ok(value)) => teardown.map(|()| value),
            Ok(Err(e)) => {
                if let Err(t) = teardown {
                    tracing::warn!("Teardown after failed case: {}", t);
                }
                Err(e)
            }
            Err(panic) => {
                if let Err(t) = teardown {
                    tracing::warn!("Teardown after panicked case: {}", t);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    fn dispose_pair(&mut self) {
        if let Some(client) = self.client.take() {
            self.fixture.dispose_client(client);
        }
        if let Some(host) = self.host.take() {
            self.fixture.dispose_host(host);
        }
    }
}

impl<F: Fixture> Drop for TestHarness<F> {
    fn drop(&mut self) {
        self.dispose_pair();
    }
}
