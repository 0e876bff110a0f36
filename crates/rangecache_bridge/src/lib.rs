//! Blocking access to asynchronous backends.
//!
//! Backends for remote storage are naturally async, but file-like APIs
//! are blocking. This crate carries the traffic between the two worlds:
//!
//! - [`SyncBridge`]: one dedicated thread runs one event loop for the
//!   process; any number of foreground threads submit futures to it and
//!   block on their own results, with per-call timeouts and re-entrancy
//!   rejection. Re-created after a fork.
//! - [`run_chunked`]: executes independent tasks concurrently in
//!   bounded-size batches, reporting progress per settled task and
//!   capturing per-task errors index-aligned with the input.
//! - [`BlockingFetcher`]: adapts an [`AsyncRangeFetcher`] to the
//!   blocking `RangeFetcher` contract the caching layer consumes.
//!
//! # Example
//!
//! ```
//! use rangecache_bridge::SyncBridge;
//!
//! # fn main() -> rangecache_bridge::BridgeResult<()> {
//! let bridge = SyncBridge::shared()?;
//! let value = bridge.run_sync(async { 40 + 2 }, None)?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod fetch;
mod sync;

pub use batch::{
    run_chunked, run_chunked_sync, BatchOptions, BatchSize, NoProgress, ProgressFn, ProgressSink,
    DEFAULT_BATCH_SIZE, NOFILES_BATCH_SIZE,
};
pub use error::{BridgeError, BridgeResult, TaskError};
pub use fetch::{AsyncRangeFetcher, BlockingFetcher};
pub use sync::SyncBridge;
