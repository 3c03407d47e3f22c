//! Cancellable deferred-stop task
//!
//! At most one task is outstanding. Arming always cancels the previous task
//! first, and a generation counter keeps a task that already woke up from
//! acting once it has been superseded. Cancelling waits for the aborted task
//! to wind down, so an action that was already running on another worker
//! has finished before the caller sends anything new.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Runs an action once a monotonic deadline passes, unless cancelled first
#[derive(Debug, Default)]
pub struct DeferredStop {
    handle: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
}

impl DeferredStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any outstanding task, then schedule `action` after `delay`
    pub async fn arm<F, Fut>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel().await;

        let armed_generation = self.generation.load(Ordering::SeqCst);
        let generation = Arc::clone(&self.generation);
        let deadline = Instant::now() + delay;

        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if generation.load(Ordering::SeqCst) != armed_generation {
                debug!("Deferred stop superseded before firing");
                return;
            }
            action().await;
        }));
    }

    /// Cancel the outstanding task, if any, and wait until it is gone
    ///
    /// Safe to call repeatedly.
    pub async fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            match handle.await {
                Ok(()) => debug!("Deferred stop finished before cancel"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => debug!(error = %e, "Deferred stop task failed"),
            }
        }
    }

    /// Abort without waiting; used where awaiting is impossible
    fn abort(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// True while a task is scheduled and has not completed
    pub fn is_armed(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for DeferredStop {
    fn drop(&mut self) {
        self.abort();
    }
}
