//! Blocking adapter for async range fetchers.

use crate::error::BridgeError;
use crate::sync::SyncBridge;
use rangecache_backend::{check_fetched_len, BackendError, BackendResult, RangeFetcher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A byte-range source whose I/O is asynchronous.
///
/// The async counterpart of [`RangeFetcher`]: `fetch` must resolve to
/// exactly `end - start` bytes or fail.
pub trait AsyncRangeFetcher: Send + Sync + 'static {
    /// Fetches `[start, end)`.
    fn fetch(&self, start: u64, end: u64) -> impl Future<Output = BackendResult<Vec<u8>>> + Send;

    /// Total object size, if known.
    fn size(&self) -> Option<u64> {
        None
    }
}

/// Presents an [`AsyncRangeFetcher`] as a blocking [`RangeFetcher`].
///
/// Each fetch is submitted to the bridge's loop thread and the calling
/// thread blocks on the result, so cache strategies and buffered files
/// can sit on top of async backends unchanged. A deadline, when set,
/// applies per fetch.
pub struct BlockingFetcher<F> {
    inner: Arc<F>,
    bridge: Arc<SyncBridge>,
    timeout: Option<Duration>,
}

impl<F: AsyncRangeFetcher> BlockingFetcher<F> {
    /// Wraps `inner`, running its I/O on `bridge`.
    pub fn new(inner: Arc<F>, bridge: Arc<SyncBridge>) -> Self {
        Self {
            inner,
            bridge,
            timeout: None,
        }
    }

    /// Wraps `inner` on the process-wide bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared bridge cannot be started.
    pub fn on_shared_bridge(inner: Arc<F>) -> Result<Self, BridgeError> {
        Ok(Self::new(inner, SyncBridge::shared()?))
    }

    /// Sets a per-fetch deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<F: AsyncRangeFetcher> RangeFetcher for BlockingFetcher<F> {
    fn fetch(&self, start: u64, end: u64) -> BackendResult<Vec<u8>> {
        let inner = Arc::clone(&self.inner);
        let data = self
            .bridge
            .run_sync(async move { inner.fetch(start, end).await }, self.timeout)
            .map_err(|err| match err {
                BridgeError::Timeout { timeout } => BackendError::Timeout { timeout },
                other => BackendError::transport(other.to_string()),
            })??;
        check_fetched_len(&data, start, end)?;
        Ok(data)
    }

    fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}
