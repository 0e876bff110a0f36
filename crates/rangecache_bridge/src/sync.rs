//! Blocking calls over a dedicated event-loop thread.

use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Bridge from blocking callers to one background event loop.
///
/// All async backend I/O for a process runs on a single dedicated thread
/// owning a current-thread runtime; any number of foreground threads
/// submit work through [`run_sync`](Self::run_sync) and block on their
/// own result. Submissions are serialized onto the loop, waits are not,
/// so many callers can have independent operations in flight at once.
///
/// The loop thread lives for the life of the process. Use
/// [`shared`](Self::shared) for the process-wide instance; it is
/// re-created after a fork, since neither the runtime nor the file
/// descriptors it owns survive one.
pub struct SyncBridge {
    handle: Handle,
    loop_thread: ThreadId,
}

impl SyncBridge {
    /// Starts a bridge with its own loop thread.
    ///
    /// Most callers want [`shared`](Self::shared) instead; a private
    /// bridge is for isolating one component's I/O.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn new() -> BridgeResult<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("rangecache-io".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = tx.send(Err(err.to_string()));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let _ = tx.send(Ok((Handle::current(), thread::current().id())));
                    // Park forever; work arrives via Handle::spawn.
                    std::future::pending::<()>().await;
                });
            })
            .map_err(|err| BridgeError::loop_unavailable(err.to_string()))?;

        let (handle, loop_thread) = rx
            .recv()
            .map_err(|_| BridgeError::loop_unavailable("loop thread exited during startup"))?
            .map_err(BridgeError::loop_unavailable)?;
        debug!(?loop_thread, "event-loop thread started");
        Ok(Self {
            handle,
            loop_thread,
        })
    }

    /// The process-wide bridge, started on first use.
    ///
    /// After a fork the child gets a fresh bridge on its first call; the
    /// parent's loop thread and descriptors do not exist in the child.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh bridge cannot be started.
    pub fn shared() -> BridgeResult<Arc<Self>> {
        static SHARED: OnceLock<Mutex<Option<(u32, Arc<SyncBridge>)>>> = OnceLock::new();
        let slot = SHARED.get_or_init(|| Mutex::new(None));

        let mut guard = slot.lock();
        let pid = std::process::id();
        if let Some((owner, bridge)) = guard.as_ref() {
            if *owner == pid {
                return Ok(Arc::clone(bridge));
            }
            warn!(parent = *owner, child = pid, "bridge crossed a fork, restarting loop");
        }
        let bridge = Arc::new(Self::new()?);
        *guard = Some((pid, Arc::clone(&bridge)));
        Ok(bridge)
    }

    /// A handle to the underlying runtime, for spawning fire-and-forget
    /// work on the loop.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `operation` on the loop thread and blocks until it completes
    /// or `timeout` elapses.
    ///
    /// On timeout the operation is told to cancel and a timeout error is
    /// returned; cancellation is cooperative, so the operation may still
    /// be running at that point. Treat a timed-out call as "caller gave
    /// up", not "operation reverted".
    ///
    /// A panic inside `operation` is captured and returned as an error,
    /// with the panic message preserved.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Reentrant`] when called from the loop thread
    /// itself, [`BridgeError::Timeout`] on deadline,
    /// [`BridgeError::Panicked`] if the operation panicked.
    pub fn run_sync<F, T>(&self, operation: F, timeout: Option<Duration>) -> BridgeResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if thread::current().id() == self.loop_thread {
            return Err(BridgeError::Reentrant);
        }

        let (tx, rx) = mpsc::channel();
        let task = self.handle.spawn(async move {
            // The receiver may have timed out and gone; ignore.
            let _ = tx.send(operation.await);
        });

        match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(value) => Ok(value),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    task.abort();
                    Err(BridgeError::Timeout { timeout })
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(panicked(task)),
            },
            None => match rx.recv() {
                Ok(value) => Ok(value),
                Err(_) => Err(panicked(task)),
            },
        }
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("loop_thread", &self.loop_thread)
            .finish()
    }
}

/// The sender was dropped without sending: the task panicked (or was
/// aborted out from under us). Recover the panic message if possible.
fn panicked(task: tokio::task::JoinHandle<()>) -> BridgeError {
    let message = match poll_settled(task) {
        Some(Err(err)) if err.is_panic() => payload_message(err.into_panic()),
        _ => "result channel closed".to_string(),
    };
    BridgeError::Panicked { message }
}

/// Polls a join handle that is known to have settled.
fn poll_settled(
    mut task: tokio::task::JoinHandle<()>,
) -> Option<Result<(), tokio::task::JoinError>> {
    use std::task::{Context, Poll};

    let waker = std::task::Waker::noop();
    let mut cx = Context::from_waker(waker);
    match std::pin::Pin::new(&mut task).poll(&mut cx) {
        Poll::Ready(result) => Some(result),
        Poll::Pending => None,
    }
}

pub(crate) fn payload_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_sync_returns_the_operations_value() {
        let bridge = SyncBridge::new().unwrap();
        let value = bridge.run_sync(async { 2 + 2 }, None).unwrap();
        assert_eq!(value, 4);
    }

    #[test]
    fn operation_errors_come_back_intact() {
        let bridge = SyncBridge::new().unwrap();
        let result: Result<u32, String> = bridge
            .run_sync(async { Err("backend said no".to_string()) }, None)
            .unwrap();
        assert_eq!(result.unwrap_err(), "backend said no");
    }

    #[test]
    fn timeout_aborts_the_wait() {
        let bridge = SyncBridge::new().unwrap();
        let result = bridge.run_sync(
            async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                1
            },
            Some(Duration::from_millis(50)),
        );
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));
    }

    #[test]
    fn reentrant_call_is_rejected_not_deadlocked() {
        let bridge = Arc::new(SyncBridge::new().unwrap());
        let inner = Arc::clone(&bridge);
        let result = bridge
            .run_sync(
                async move { inner.run_sync(std::future::ready(1), None) },
                Some(Duration::from_secs(5)),
            )
            .unwrap();
        assert!(matches!(result, Err(BridgeError::Reentrant)));
    }

    #[test]
    fn panic_in_operation_is_captured() {
        let bridge = SyncBridge::new().unwrap();
        let result: BridgeResult<u32> =
            bridge.run_sync(async { panic!("kaboom") }, None);
        match result {
            Err(BridgeError::Panicked { message }) => assert!(message.contains("kaboom")),
            other => panic!("expected panic capture, got {other:?}"),
        }
    }

    #[test]
    fn shared_bridge_is_reused() {
        let first = SyncBridge::shared().unwrap();
        let second = SyncBridge::shared().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn many_threads_wait_concurrently() {
        let bridge = Arc::new(SyncBridge::new().unwrap());
        let started = std::time::Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    bridge
                        .run_sync(
                            async move {
                                tokio::time::sleep(Duration::from_millis(100)).await;
                                i
                            },
                            None,
                        )
                        .unwrap()
                })
            })
            .collect();
        let mut results: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_unstable();

        assert_eq!(results, (0..8).collect::<Vec<_>>());
        // Sleeps interleave on the loop instead of running back to back
        assert!(started.elapsed() < Duration::from_millis(600));
    }
}
