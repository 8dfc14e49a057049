//! `start_mutex` coalescing (§4.8, §5): a second concurrent `start`,
//! `launch`, or `restart` against the same instance attaches to the
//! in-flight wait-for-ready future instead of racing it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fleet_core::error::FleetError;
use futures::future::{FutureExt, Shared};
use tokio::sync::Mutex;

type WaitForReady = Shared<Pin<Box<dyn Future<Output = Result<(), FleetError>> + Send>>>;

/// Process-wide registry of in-flight "wait until the instance is ready"
/// futures, keyed by instance name. Acquiring `start_mutex` and consulting
/// this map is the critical section described in §4.8; everything after
/// that (actually awaiting the future) happens outside the lock so
/// unrelated instances are never serialized behind one another.
#[derive(Default)]
pub struct StartCoalescer {
    start_mutex: Mutex<HashMap<String, WaitForReady>>,
}

impl StartCoalescer {
    pub fn new() -> Self {
        StartCoalescer::default()
    }

    /// Returns the in-flight wait-for-ready future for `instance` if one
    /// is already running, otherwise registers `spawn_wait` as the new
    /// one and returns it. Both the caller that spawns and every caller
    /// that attaches observe the same eventual result.
    pub async fn wait_for_ready<F>(&self, instance: &str, spawn_wait: F) -> WaitForReady
    where
        F: FnOnce() -> Pin<Box<dyn Future<Output = Result<(), FleetError>> + Send>>,
    {
        let mut in_flight = self.start_mutex.lock().await;
        if let Some(existing) = in_flight.get(instance) {
            return existing.clone();
        }
        let shared = spawn_wait().shared();
        in_flight.insert(instance.to_string(), shared.clone());
        shared
    }

    /// Drops the completed future from the registry so a later `start` on
    /// the same (now-ready) instance spawns a fresh wait rather than
    /// instantly replaying a stale cached result.
    pub async fn clear(&self, instance: &str) {
        self.start_mutex.lock().await.remove(instance);
    }
}

pub fn boxed<F>(fut: F) -> Pin<Box<dyn Future<Output = Result<(), FleetError>> + Send>>
where
    F: Future<Output = Result<(), FleetError>> + Send + 'static,
{
    Box::pin(fut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_concurrent_start_attaches_to_in_flight_future() {
        let coalescer = Arc::new(StartCoalescer::new());
        let spawn_count = Arc::new(AtomicU32::new(0));

        let make_wait = {
            let spawn_count = spawn_count.clone();
            move || {
                spawn_count.fetch_add(1, Ordering::SeqCst);
                boxed(async {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok(())
                })
            }
        };

        let a = coalescer.wait_for_ready("vm-1", make_wait.clone()).await;
        let b = coalescer.wait_for_ready("vm-1", make_wait).await;

        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
        assert!(a.await.is_ok());
        assert!(b.await.is_ok());
    }

    #[tokio::test]
    async fn different_instances_do_not_coalesce() {
        let coalescer = StartCoalescer::new();
        let spawn_count = Arc::new(AtomicU32::new(0));

        let make_wait = |spawn_count: Arc<AtomicU32>| {
            move || {
                spawn_count.fetch_add(1, Ordering::SeqCst);
                boxed(async { Ok(()) })
            }
        };

        coalescer.wait_for_ready("vm-1", make_wait(spawn_count.clone())).await;
        coalescer.wait_for_ready("vm-2", make_wait(spawn_count.clone())).await;

        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_allows_a_fresh_wait_to_be_spawned() {
        let coalescer = StartCoalescer::new();
        let spawn_count = Arc::new(AtomicU32::new(0));
        let make_wait = |spawn_count: Arc<AtomicU32>| {
            move || {
                spawn_count.fetch_add(1, Ordering::SeqCst);
                boxed(async { Ok(()) })
            }
        };

        let first = coalescer.wait_for_ready("vm-1", make_wait(spawn_count.clone())).await;
        first.await.unwrap();
        coalescer.clear("vm-1").await;
        coalescer.wait_for_ready("vm-1", make_wait(spawn_count.clone())).await;

        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);
    }
}
