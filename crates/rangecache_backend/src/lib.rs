//! # rangecache backend contracts
//!
//! The two narrow contracts the caching engine consumes, plus reference
//! implementations.
//!
//! Backends are **opaque transports**. A cache strategy pulls data through
//! [`RangeFetcher`] and a buffered write file pushes data through
//! [`UploadTarget`]; neither side knows how bytes actually move.
//!
//! ## Design Principles
//!
//! - Fetchers return exactly the requested range or fail
//! - Uploads are forward-only chunk streams with an explicit final chunk
//! - No retries at this layer; transport errors propagate unchanged
//!
//! ## Available Implementations
//!
//! - [`MemoryFetcher`] / [`MemoryUpload`] - In-memory, for testing
//! - [`FileFetcher`] / [`FileUpload`] - Local files
//!
//! ## Example
//!
//! ```rust
//! use rangecache_backend::{MemoryFetcher, RangeFetcher};
//!
//! let fetcher = MemoryFetcher::new(b"hello world".to_vec());
//! assert_eq!(fetcher.fetch(0, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fetch;
mod file;
mod memory;
mod upload;

pub use error::{BackendError, BackendResult};
pub use fetch::{check_fetched_len, RangeFetcher};
pub use file::{FileFetcher, FileUpload};
pub use memory::{
    FailingFetcher, FlakyCommitUpload, FlakyUpload, MemoryFetcher, MemoryUpload, UploadState,
};
pub use upload::UploadTarget;
