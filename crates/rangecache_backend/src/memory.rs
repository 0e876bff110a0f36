//! In-memory backend implementations for testing.

use crate::error::{BackendError, BackendResult};
use crate::fetch::RangeFetcher;
use crate::upload::UploadTarget;
use parking_lot::Mutex;
use std::sync::Arc;

/// An in-memory range fetcher.
///
/// Serves ranges out of a byte vector and records every fetch it performs,
/// which makes it suitable for:
/// - Unit tests that assert on fetch counts and ranges
/// - Ephemeral sources that are already fully in memory
///
/// # Thread Safety
///
/// The fetcher is thread-safe; the fetch log is lock-protected.
///
/// # Example
///
/// ```rust
/// use rangecache_backend::{MemoryFetcher, RangeFetcher};
///
/// let fetcher = MemoryFetcher::new(b"0123456789".to_vec());
/// assert_eq!(fetcher.fetch(2, 5).unwrap(), b"234");
/// assert_eq!(fetcher.fetch_log(), vec![(2, 5)]);
/// ```
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    data: Vec<u8>,
    log: Mutex<Vec<(u64, u64)>>,
}

impl MemoryFetcher {
    /// Creates a fetcher over the given bytes.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Returns every `(start, end)` range fetched so far, in call order.
    #[must_use]
    pub fn fetch_log(&self) -> Vec<(u64, u64)> {
        self.log.lock().clone()
    }

    /// Returns the number of fetch calls made so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.log.lock().len()
    }
}

impl RangeFetcher for MemoryFetcher {
    fn fetch(&self, start: u64, end: u64) -> BackendResult<Vec<u8>> {
        let size = self.data.len() as u64;
        if start > end || end > size {
            return Err(BackendError::RangeOutOfBounds { start, end, size });
        }
        self.log.lock().push((start, end));
        Ok(self.data[start as usize..end as usize].to_vec())
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// A range fetcher that fails every call.
///
/// Useful for asserting that a code path never touches the transport.
#[derive(Debug, Default)]
pub struct FailingFetcher;

impl RangeFetcher for FailingFetcher {
    fn fetch(&self, start: u64, end: u64) -> BackendResult<Vec<u8>> {
        Err(BackendError::transport(format!(
            "unexpected fetch of [{start}, {end})"
        )))
    }
}

/// An in-memory upload target.
///
/// Records every chunk and the commit/discard outcome so tests can assert
/// on the exact upload sequence. The recorded state is shared through an
/// [`Arc`], so it stays observable after the target has been moved into a
/// write file.
#[derive(Debug, Default)]
pub struct MemoryUpload {
    state: Arc<Mutex<UploadState>>,
}

/// Observable state of a [`MemoryUpload`].
#[derive(Debug, Default)]
pub struct UploadState {
    /// Whether `initiate` has been called.
    pub initiated: bool,
    /// Every uploaded chunk, in order, with its `final` flag.
    pub chunks: Vec<(Vec<u8>, bool)>,
    /// Whether the upload was committed.
    pub committed: bool,
    /// Whether the upload was discarded.
    pub discarded: bool,
}

impl UploadState {
    /// Concatenation of all uploaded chunks.
    #[must_use]
    pub fn joined(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|(c, _)| c.clone()).collect()
    }
}

impl MemoryUpload {
    /// Creates a new empty upload target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the shared observable state.
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<UploadState>> {
        Arc::clone(&self.state)
    }
}

impl UploadTarget for MemoryUpload {
    fn initiate(&mut self) -> BackendResult<()> {
        self.state.lock().initiated = true;
        Ok(())
    }

    fn upload_chunk(&mut self, data: &[u8], final_chunk: bool) -> BackendResult<()> {
        let mut state = self.state.lock();
        if state.chunks.last().is_some_and(|(_, fin)| *fin) {
            return Err(BackendError::UploadFinalized);
        }
        state.chunks.push((data.to_vec(), final_chunk));
        Ok(())
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.state.lock().committed = true;
        Ok(())
    }

    fn discard(&mut self) -> BackendResult<()> {
        self.state.lock().discarded = true;
        Ok(())
    }
}

/// An upload target whose final chunk fails once.
///
/// Used to test that a failed final flush leaves a file un-committed.
#[derive(Debug, Default)]
pub struct FlakyUpload {
    inner: MemoryUpload,
    failed_once: bool,
}

impl FlakyUpload {
    /// Creates a new flaky upload target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the shared observable state.
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<UploadState>> {
        self.inner.state()
    }
}

impl UploadTarget for FlakyUpload {
    fn initiate(&mut self) -> BackendResult<()> {
        self.inner.initiate()
    }

    fn upload_chunk(&mut self, data: &[u8], final_chunk: bool) -> BackendResult<()> {
        if final_chunk && !self.failed_once {
            self.failed_once = true;
            return Err(BackendError::transport("final chunk rejected"));
        }
        self.inner.upload_chunk(data, final_chunk)
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.inner.commit()
    }

    fn discard(&mut self) -> BackendResult<()> {
        self.inner.discard()
    }
}

/// An upload target whose commit fails once.
///
/// Used to test that a failed commit leaves the staged upload
/// recoverable: the chunks are all in, only finalization misfired.
#[derive(Debug, Default)]
pub struct FlakyCommitUpload {
    inner: MemoryUpload,
    failed_once: bool,
}

impl FlakyCommitUpload {
    /// Creates a new upload target whose first commit fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the shared observable state.
    #[must_use]
    pub fn state(&self) -> Arc<Mutex<UploadState>> {
        self.inner.state()
    }
}

impl UploadTarget for FlakyCommitUpload {
    fn initiate(&mut self) -> BackendResult<()> {
        self.inner.initiate()
    }

    fn upload_chunk(&mut self, data: &[u8], final_chunk: bool) -> BackendResult<()> {
        self.inner.upload_chunk(data, final_chunk)
    }

    fn commit(&mut self) -> BackendResult<()> {
        if !self.failed_once {
            self.failed_once = true;
            return Err(BackendError::transport("commit rejected"));
        }
        self.inner.commit()
    }

    fn discard(&mut self) -> BackendResult<()> {
        self.inner.discard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fetcher_serves_exact_range() {
        let fetcher = MemoryFetcher::new(b"hello world".to_vec());
        assert_eq!(fetcher.fetch(0, 5).unwrap(), b"hello");
        assert_eq!(fetcher.fetch(6, 11).unwrap(), b"world");
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn memory_fetcher_rejects_out_of_bounds() {
        let fetcher = MemoryFetcher::new(b"hello".to_vec());
        let result = fetcher.fetch(3, 10);
        assert!(matches!(
            result,
            Err(BackendError::RangeOutOfBounds { .. })
        ));
        // Failed calls are not logged
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[test]
    fn memory_fetcher_empty_range() {
        let fetcher = MemoryFetcher::new(b"hello".to_vec());
        assert!(fetcher.fetch(2, 2).unwrap().is_empty());
    }

    #[test]
    fn memory_upload_records_chunks_in_order() {
        let mut upload = MemoryUpload::new();
        let state = upload.state();

        upload.initiate().unwrap();
        upload.upload_chunk(b"abc", false).unwrap();
        upload.upload_chunk(b"def", true).unwrap();
        upload.commit().unwrap();

        let state = state.lock();
        assert!(state.initiated);
        assert!(state.committed);
        assert_eq!(state.chunks.len(), 2);
        assert_eq!(state.joined(), b"abcdef");
        assert!(state.chunks[1].1);
    }

    #[test]
    fn memory_upload_rejects_chunk_after_final() {
        let mut upload = MemoryUpload::new();
        upload.initiate().unwrap();
        upload.upload_chunk(b"abc", true).unwrap();

        let result = upload.upload_chunk(b"def", false);
        assert!(matches!(result, Err(BackendError::UploadFinalized)));
    }

    #[test]
    fn flaky_commit_fails_once_then_succeeds() {
        let mut upload = FlakyCommitUpload::new();
        let state = upload.state();
        upload.initiate().unwrap();
        upload.upload_chunk(b"abc", true).unwrap();

        assert!(upload.commit().is_err());
        assert!(!state.lock().committed);

        upload.commit().unwrap();
        assert!(state.lock().committed);
    }

    #[test]
    fn failing_fetcher_always_errors() {
        let fetcher = FailingFetcher;
        assert!(fetcher.fetch(0, 1).is_err());
    }
}
