//! Periodic background manifest refresh with force-refresh cancel/re-arm
//! (§4.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::source::ManifestSource;

/// Handle to a running refresh loop. Dropping it does not stop the task;
/// call `stop()` explicitly (mirrors `fleet_vm::DelayedShutdownRegistry`'s
/// explicit-cancel style rather than scope-bound cancellation).
pub struct RefreshScheduler {
    force: Arc<Notify>,
    task: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Spawn the loop: sleep for `interval`, or wake early on
    /// `force_refresh()`. Skips a tick if the previous refresh is still
    /// running.
    pub fn spawn(source: Arc<Mutex<ManifestSource>>, interval: Duration) -> Self {
        let force = Arc::new(Notify::new());
        let force_wait = Arc::clone(&force);
        let in_flight = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = force_wait.notified() => {}
                }

                if in_flight.swap(true, Ordering::SeqCst) {
                    continue;
                }

                let mut guard = source.lock().await;
                if let Err(e) = guard.update_manifests(true).await {
                    warn!(error = %e, "periodic manifest refresh failed");
                }
                drop(guard);

                in_flight.store(false, Ordering::SeqCst);
            }
        });

        RefreshScheduler { force, task }
    }

    /// Wake the loop immediately instead of waiting for the next interval
    /// tick; the loop re-arms its sleep for the next full interval
    /// afterward.
    pub fn force_refresh(&self) {
        self.force.notify_one();
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
