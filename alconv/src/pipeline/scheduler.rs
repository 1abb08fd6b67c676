//! Run-loop lifetime for the batch
//!
//! The scheduler owns a single-threaded tokio runtime. Work only runs between
//! `start` and `stop`; `stop` cancels the shared token so a running batch stops
//! taking new jobs.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// How long `stop` waits for tasks spawned on the runtime
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Scheduler {
    runtime: Option<Runtime>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            runtime: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Build the runtime; calling it again while running is a no-op
    pub fn start(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let runtime = Builder::new_current_thread().enable_all().build()?;
        self.runtime = Some(runtime);
        debug!("Scheduler started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// Token cancelled by [`Scheduler::stop`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `future` to completion on the scheduler's runtime
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| Error::InvalidState("scheduler is not started".to_string()))?;
        Ok(runtime.block_on(future))
    }

    /// Spawn a background task, e.g. a signal listener
    pub fn spawn<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| Error::InvalidState("scheduler is not started".to_string()))?;
        runtime.spawn(future);
        Ok(())
    }

    /// Cancel outstanding work and shut the runtime down
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            debug!("Scheduler stopped");
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
