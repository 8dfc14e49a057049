//! Deadline-based polling for guest-readiness waits (SSH up, cloud-init
//! done, hypervisor state settle). Driven by a wall-clock deadline rather
//! than a fixed attempt count, and tolerant of transient `action` errors
//! rather than failing fast on the first one (§5 "Cancellation and
//! timeouts").

use std::time::Duration;

use fleet_core::error::FleetError;
use tokio::time::Instant;
use tracing::debug;

/// Polls `action` until it reports readiness (`Ok(true)`) or `deadline`
/// passes. `action` errors are logged and treated as "not ready yet"
/// rather than aborting the wait, since most callers are polling a guest
/// that may be transiently unreachable mid-boot. Sleeps between polls
/// start at 50ms and double, capped at 1 second.
pub async fn try_action_for<F, Fut>(deadline: Instant, mut action: F) -> Result<(), FleetError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    let mut delay = Duration::from_millis(50);
    loop {
        match action().await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => debug!(error = %e, "readiness check failed, will retry"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(FleetError::DeadlineExceeded {
                message: "action did not complete before the deadline".to_string(),
            });
        }
        let sleep_for = delay.min(deadline - now).min(Duration::from_secs(1));
        tokio::time::sleep(sleep_for).await;
        delay = (delay * 2).min(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_action_reports_ready() {
        let attempts = Cell::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = try_action_for(deadline, || {
            let n = attempts.get() + 1;
            attempts.set(n);
            async move { Ok(n >= 3) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_if_never_ready() {
        let deadline = Instant::now() + Duration::from_millis(200);
        let result = try_action_for(deadline, || async { Ok(false) }).await;
        assert!(matches!(result, Err(FleetError::DeadlineExceeded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn treats_action_errors_as_transient() {
        let attempts = Cell::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = try_action_for(deadline, || {
            let n = attempts.get() + 1;
            attempts.set(n);
            async move {
                if n < 2 {
                    anyhow::bail!("guest unreachable");
                }
                Ok(true)
            }
        })
        .await;
        assert!(result.is_ok());
    }
}
