//! Per-instance delayed-shutdown timers (§4.6).

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Tracks the in-flight delayed-shutdown timer for each instance so
/// `cancel_stop` can abort it. Also owns the "cancel a pending timer on
/// suspend" resolution recorded in SPEC_FULL §4.6 / DESIGN.md.
#[derive(Default)]
pub struct DelayedShutdownRegistry {
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DelayedShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that invokes `on_fire` after `delay`. Replaces (and
    /// aborts) any existing timer for this instance.
    pub async fn arm<F>(&self, instance: &str, delay: Duration, on_fire: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        });
        let mut timers = self.timers.lock().await;
        if let Some(old) = timers.insert(instance.to_string(), handle) {
            old.abort();
        }
    }

    /// Cancel a pending timer, if any. Returns `true` if one was armed.
    pub async fn cancel(&self, instance: &str) -> bool {
        let mut timers = self.timers.lock().await;
        if let Some(handle) = timers.remove(instance) {
            handle.abort();
            true
        } else {
            false
        }
    }

    pub async fn is_armed(&self, instance: &str) -> bool {
        self.timers.lock().await.contains_key(instance)
    }
}
