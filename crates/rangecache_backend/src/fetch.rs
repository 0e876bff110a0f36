//! Byte-range fetcher trait definition.

use crate::error::{BackendError, BackendResult};

/// A source of bytes addressable by range.
///
/// This is the narrow contract a cache strategy uses to pull data from a
/// backend. Implementations may be backed by local files, network
/// protocols, or archives; the cache layer never knows which.
///
/// # Invariants
///
/// - `fetch(start, end)` returns exactly `end - start` bytes or an error
/// - `start <= end` and, when the size is known, `end <= size`
/// - Fetchers must be `Send + Sync`; one fetcher may serve several cache
///   instances concurrently
///
/// # Implementors
///
/// - [`super::MemoryFetcher`] - For testing
/// - [`super::FileFetcher`] - For local files
pub trait RangeFetcher: Send + Sync {
    /// Fetches the bytes in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is out of bounds or the transport
    /// fails. Errors are propagated to the caller unchanged; this layer
    /// does not retry.
    fn fetch(&self, start: u64, end: u64) -> BackendResult<Vec<u8>>;

    /// Returns the total size of the object, if known.
    ///
    /// Streamed sources may not know their size; range validation is then
    /// left to the transport.
    fn size(&self) -> Option<u64> {
        None
    }
}

impl<T: RangeFetcher + ?Sized> RangeFetcher for std::sync::Arc<T> {
    fn fetch(&self, start: u64, end: u64) -> BackendResult<Vec<u8>> {
        (**self).fetch(start, end)
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }
}

/// Validates a fetched buffer against the requested range.
///
/// # Errors
///
/// Returns [`BackendError::ShortRead`] if the buffer length does not match
/// `end - start`.
pub fn check_fetched_len(data: &[u8], start: u64, end: u64) -> BackendResult<()> {
    let wanted = (end - start) as usize;
    if data.len() != wanted {
        return Err(BackendError::ShortRead {
            wanted,
            got: data.len(),
        });
    }
    Ok(())
}
