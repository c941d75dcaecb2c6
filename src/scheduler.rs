/*!
 * Dedicated worker pool for connection-error tasks
 *
 * Connection-error rules run one recurring task each. They are kept off the
 * request-serving runtime on a small multi-threaded runtime owned by the
 * engine. The runtime is built when the first task is scheduled and shut down
 * when the scheduler is dropped.
 */

use crate::error::{FaultError, Result};
use parking_lot::Mutex;
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug)]
pub struct InjectionScheduler {
    workers: usize,
    /// Runtime owned by this scheduler, built on first use
    runtime: Mutex<Option<Runtime>>,
    /// Borrowed runtime used instead of an owned one
    external: Option<Handle>,
}

impl InjectionScheduler {
    /// Scheduler with its own runtime of `workers` threads
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            runtime: Mutex::new(None),
            external: None,
        }
    }

    /// Scheduler spawning onto an existing runtime (tests, embedding)
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            workers: 0,
            runtime: Mutex::new(None),
            external: Some(handle),
        }
    }

    pub fn spawn<F>(&self, task: F) -> Result<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Ok(self.handle()?.spawn(task))
    }

    /// Whether an owned runtime has been started
    pub fn is_started(&self) -> bool {
        self.external.is_some() || self.runtime.lock().is_some()
    }

    fn handle(&self) -> Result<Handle> {
        if let Some(handle) = &self.external {
            return Ok(handle.clone());
        }

        let mut runtime = self.runtime.lock();
        if let Some(rt) = runtime.as_ref() {
            return Ok(rt.handle().clone());
        }

        let rt = Builder::new_multi_thread()
            .worker_threads(self.workers)
            .thread_name("faultline-injector")
            .enable_time()
            .build()
            .map_err(|e| {
                error!(error = %e, "Failed to start injection worker pool");
                FaultError::Io(e)
            })?;
        debug!(workers = self.workers, "Started injection worker pool");
        let handle = rt.handle().clone();
        *runtime = Some(rt);
        Ok(handle)
    }
}

impl Drop for InjectionScheduler {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.get_mut().take() {
            debug!("Shutting down injection worker pool");
            rt.shutdown_background();
        }
    }
}
