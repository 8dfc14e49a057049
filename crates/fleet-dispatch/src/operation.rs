//! Async operation runner (C11, §4.8): wraps a long-running task with a
//! progress channel the connection writer drains and a final result the
//! caller awaits. Generic over the progress message type so this crate
//! doesn't need to depend on `fleet-rpc`'s wire reply type.

use fleet_core::error::FleetError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default channel capacity for an operation's progress stream.
pub const DEFAULT_PROGRESS_BUFFER: usize = 32;

/// A handle to a spawned long-running operation: progress arrives on
/// `progress_rx` as it's emitted, the final outcome arrives from
/// `finish()`.
pub struct Operation<T, R> {
    pub progress_rx: mpsc::Receiver<T>,
    handle: JoinHandle<Result<R, FleetError>>,
}

impl<T, R> Operation<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Spawns `work` on the Tokio runtime, giving it a progress sender to
    /// report through. If the client disconnects, `progress_rx` (and this
    /// `Operation`) is dropped; subsequent sends on the task's copy of the
    /// sender return `Err` and are swallowed rather than aborting the task
    /// (§4.8 "in-flight tasks finish their current step ... sends become
    /// no-ops rather than errors").
    pub fn spawn<F, Fut>(work: F) -> Self
    where
        F: FnOnce(mpsc::Sender<T>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<R, FleetError>> + Send + 'static,
    {
        Self::spawn_with_buffer(DEFAULT_PROGRESS_BUFFER, work)
    }

    pub fn spawn_with_buffer<F, Fut>(buffer: usize, work: F) -> Self
    where
        F: FnOnce(mpsc::Sender<T>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<R, FleetError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = tokio::spawn(work(tx));
        Operation {
            progress_rx: rx,
            handle,
        }
    }

    /// Awaits the task's terminal result. A panic inside the task surfaces
    /// as `FleetError::Internal` rather than propagating the panic.
    pub async fn finish(self) -> Result<R, FleetError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_error) => Err(FleetError::Internal {
                message: format!("operation task panicked: {join_error}"),
            }),
        }
    }
}

/// Sends a progress message, swallowing a dropped-receiver error — the
/// client having gone away mid-operation is not itself a task failure.
pub async fn send_progress<T: Send>(sender: &mpsc::Sender<T>, message: T) {
    if sender.send(message).await.is_err() {
        debug!("progress receiver dropped, discarding message");
    }
}
