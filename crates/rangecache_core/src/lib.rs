//! Buffered file access over range-addressed backends.
//!
//! Remote object stores serve bytes by range, not by stream. This crate
//! turns a pair of backend primitives, fetch-a-byte-range and
//! upload-a-chunk, into a familiar seekable file API with pluggable read
//! caching:
//!
//! - [`cache`]: the cache strategy family. Nine built-in strategies are
//!   registered by name, from pass-through to LRU block caches with
//!   background prefetch; [`cache::register_cache`] adds custom ones.
//! - [`file`]: [`BufferedFile`], the file-like object, with buffered
//!   block-wise writes and a staged commit/discard lifecycle.
//! - [`Transaction`]: groups staged uploads to commit in order or
//!   discard together.
//! - [`instances`]: token-keyed sharing of expensive backend instances.
//!
//! # Example
//!
//! ```
//! use rangecache_core::file::{BufferedFile, FileOptions};
//! use rangecache_backend::{MemoryFetcher, RangeFetcher};
//! use std::io::SeekFrom;
//! use std::sync::Arc;
//!
//! # fn main() -> rangecache_core::CoreResult<()> {
//! let fetcher: Arc<dyn RangeFetcher> =
//!     Arc::new(MemoryFetcher::new(b"hello, range world".to_vec()));
//! let mut file = BufferedFile::open_read(
//!     "mem://greeting",
//!     fetcher,
//!     FileOptions::new().block_size(8).cache_type("blockcache"),
//! )?;
//!
//! file.seek(SeekFrom::Start(7))?;
//! assert_eq!(file.read(5)?, b"range");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod error;
pub mod file;
pub mod instances;
mod transaction;

pub use error::{CoreError, CoreResult};
pub use file::{BufferedFile, FileMode, FileOptions, OnClose, WriteState, DEFAULT_BLOCK_SIZE};
pub use instances::{instance_token, InstanceCache};
pub use transaction::Transaction;
