//! Buffered file handles over fetch/upload backends.
//!
//! [`BufferedFile`] is the public file-like object: random-access reads
//! served through a pluggable cache strategy, and forward-only buffered
//! writes pushed to a chunked upload target. Seeking is cheap in read
//! mode because caches are range-addressed, not stream-addressed.

mod on_close;

pub use on_close::OnClose;

use crate::cache::{create_cache, CacheOptions, CacheParams, ReadCache};
use crate::error::{CoreError, CoreResult};
use rangecache_backend::{RangeFetcher, UploadTarget};
use std::io::{self, SeekFrom};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default read/write block size: 5 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 5 * 1024 * 1024;

/// File open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Random-access reads through a cache strategy.
    Read,
    /// Forward-only buffered writes creating a new object.
    Write,
    /// Forward-only buffered writes continuing an existing object.
    Append,
}

/// Lifecycle of a write-mode file.
///
/// `Open → (write)* → final flush → Staged → {Committed | Discarded}`.
/// An autocommit close passes through `Staged` and commits right away;
/// with autocommit off the file stays staged for a transaction. The
/// terminal states are final; reopening requires a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Accepting writes.
    Open,
    /// Final flush done, awaiting commit or discard (autocommit off).
    Staged,
    /// Object finalized under its target path.
    Committed,
    /// Partial upload thrown away.
    Discarded,
}

/// Options for opening a [`BufferedFile`].
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Buffer/fetch unit.
    pub block_size: u64,
    /// Registry name of the read-mode cache strategy.
    pub cache_type: String,
    /// Options forwarded to the cache strategy.
    pub cache_options: CacheOptions,
    /// Whether closing finalizes the object immediately, or stages it for
    /// a [`crate::Transaction`].
    pub autocommit: bool,
    /// Object size, if already known (read and append modes).
    pub size: Option<u64>,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_type: "readahead".to_string(),
            cache_options: CacheOptions::default(),
            autocommit: true,
            size: None,
        }
    }
}

impl FileOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    #[must_use]
    pub fn block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the read-mode cache strategy by registry name.
    #[must_use]
    pub fn cache_type(mut self, name: impl Into<String>) -> Self {
        self.cache_type = name.into();
        self
    }

    /// Sets strategy-specific cache options.
    #[must_use]
    pub fn cache_options(mut self, options: CacheOptions) -> Self {
        self.cache_options = options;
        self
    }

    /// Sets whether closing commits immediately.
    #[must_use]
    pub fn autocommit(mut self, value: bool) -> Self {
        self.autocommit = value;
        self
    }

    /// Sets the known object size.
    #[must_use]
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

enum State {
    Read {
        cache: Option<Box<dyn ReadCache>>,
        size: Option<u64>,
    },
    Write {
        target: Box<dyn UploadTarget>,
        buffer: Vec<u8>,
        uploaded: u64,
        initiated: bool,
        forced: bool,
        write_state: WriteState,
    },
}

/// A buffered, seekable file object over backend fetch/upload primitives.
///
/// Read-mode instances own a cache strategy; write-mode instances own a
/// write buffer flushed block-wise to an [`UploadTarget`]. Writes are
/// forward-only because chunked upload protocols are append-only, so
/// seeking a write-mode file is an error.
///
/// `close` is idempotent. Closing a write-mode file performs the final
/// flush; if that flush fails the file stays open and un-committed so the
/// caller can retry or discard, and buffered data is never silently
/// dropped.
pub struct BufferedFile {
    path: String,
    mode: FileMode,
    block_size: u64,
    pos: u64,
    closed: bool,
    autocommit: bool,
    state: State,
}

impl BufferedFile {
    /// Opens a file for reading through the named cache strategy.
    ///
    /// The object size is taken from `options.size` or from the fetcher.
    /// Strategies other than `"none"` and `"bytes"` fail with a
    /// configuration error when the size is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache strategy cannot be constructed.
    pub fn open_read(
        path: impl Into<String>,
        fetcher: Arc<dyn RangeFetcher>,
        options: FileOptions,
    ) -> CoreResult<Self> {
        let size = options.size.or_else(|| fetcher.size());
        let params = CacheParams {
            block_size: options.block_size,
            fetcher,
            size,
            options: options.cache_options,
        };
        let cache = create_cache(&options.cache_type, params)?;
        Ok(Self {
            path: path.into(),
            mode: FileMode::Read,
            block_size: options.block_size,
            pos: 0,
            closed: false,
            autocommit: options.autocommit,
            state: State::Read {
                cache: Some(cache),
                size,
            },
        })
    }

    /// Opens a file for reading over an already-constructed cache, e.g. a
    /// shared `Arc<BlockCache>` backing several handles.
    pub fn with_cache(path: impl Into<String>, cache: Box<dyn ReadCache>) -> Self {
        let size = cache.size();
        let block_size = cache.block_size();
        Self {
            path: path.into(),
            mode: FileMode::Read,
            block_size,
            pos: 0,
            closed: false,
            autocommit: true,
            state: State::Read {
                cache: Some(cache),
                size,
            },
        }
    }

    /// Opens a file for writing a new object.
    pub fn open_write(
        path: impl Into<String>,
        target: Box<dyn UploadTarget>,
        options: FileOptions,
    ) -> Self {
        Self {
            path: path.into(),
            mode: FileMode::Write,
            block_size: options.block_size,
            pos: 0,
            closed: false,
            autocommit: options.autocommit,
            state: State::Write {
                target,
                buffer: Vec::new(),
                uploaded: 0,
                initiated: false,
                forced: false,
                write_state: WriteState::Open,
            },
        }
    }

    /// Opens a file for appending to an existing object of known size.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the existing size is not given.
    pub fn open_append(
        path: impl Into<String>,
        target: Box<dyn UploadTarget>,
        options: FileOptions,
    ) -> CoreResult<Self> {
        let size = options
            .size
            .ok_or_else(|| CoreError::config("append mode requires the existing object size"))?;
        let mut file = Self::open_write(path, target, options);
        file.mode = FileMode::Append;
        file.pos = size;
        Ok(file)
    }

    /// The path this handle refers to.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The open mode.
    #[must_use]
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// The block size in use.
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Whether the handle has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The object size, if known (read mode).
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match &self.state {
            State::Read { size, .. } => *size,
            State::Write { .. } => None,
        }
    }

    /// The write lifecycle state; `None` in read mode.
    #[must_use]
    pub fn write_state(&self) -> Option<WriteState> {
        match &self.state {
            State::Read { .. } => None,
            State::Write { write_state, .. } => Some(*write_state),
        }
    }

    /// Current file position.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Moves the file position (read mode only).
    ///
    /// Seeking never fetches; caches are range-addressed.
    ///
    /// # Errors
    ///
    /// Returns an error in write mode, when closed, or when the target
    /// position is negative.
    pub fn seek(&mut self, from: SeekFrom) -> CoreResult<u64> {
        self.ensure_open()?;
        let State::Read { size, .. } = &self.state else {
            return Err(CoreError::invalid_operation(
                "seek is unsupported on a write-mode file: chunked uploads are append-only",
            ));
        };
        let new_pos = match from {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => {
                let size = size.ok_or_else(|| {
                    CoreError::config("cannot seek from end: file size unknown")
                })?;
                i128::from(size) + i128::from(delta)
            }
        };
        if new_pos < 0 {
            return Err(CoreError::config(format!(
                "cannot seek to negative position {new_pos}"
            )));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }

    /// Reads up to `len` bytes from the current position, fewer at
    /// end-of-file.
    ///
    /// # Errors
    ///
    /// Returns an error in write mode, when closed, or when the backend
    /// fetch fails.
    pub fn read(&mut self, len: usize) -> CoreResult<Vec<u8>> {
        self.ensure_open()?;
        let pos = self.pos;
        let State::Read { cache, size } = &mut self.state else {
            return Err(CoreError::invalid_operation("file not open for reading"));
        };
        let cache = cache.as_mut().ok_or(CoreError::Closed)?;

        let end = match size {
            Some(size) => (pos + len as u64).min(*size),
            // Unknown size: trust the caller's range (pass-through/bytes).
            None => pos + len as u64,
        };
        if end <= pos {
            return Ok(Vec::new());
        }
        let out = cache.read(pos, end)?;
        self.pos += out.len() as u64;
        Ok(out)
    }

    /// Reads all bytes from the current position to end-of-file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the size is unknown.
    pub fn read_all(&mut self) -> CoreResult<Vec<u8>> {
        let size = self
            .size()
            .ok_or_else(|| CoreError::config("cannot read to end: file size unknown"))?;
        let len = size.saturating_sub(self.pos) as usize;
        self.read(len)
    }

    /// Reads until `delim` (inclusive) or end-of-file, scanning forward
    /// one block at a time so the whole file never has to fit in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend fetch fails.
    pub fn read_until(&mut self, delim: u8, step: Option<usize>) -> CoreResult<Vec<u8>> {
        let step = step.unwrap_or(self.block_size.max(1) as usize);
        let mut out = Vec::new();
        loop {
            let chunk = self.read(step)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            if let Some(at) = chunk.iter().position(|&b| b == delim) {
                out.extend_from_slice(&chunk[..=at]);
                let overshoot = (chunk.len() - at - 1) as i64;
                self.seek(SeekFrom::Current(-overshoot))?;
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Reads one line, including the trailing newline if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend fetch fails.
    pub fn read_line(&mut self) -> CoreResult<Vec<u8>> {
        self.read_until(b'\n', None)
    }

    /// Appends `data` to the write buffer, flushing block-sized chunks to
    /// the upload target as the buffer fills.
    ///
    /// # Errors
    ///
    /// Returns an error in read mode, when closed, after a final flush,
    /// or when an upload fails.
    pub fn write(&mut self, data: &[u8]) -> CoreResult<usize> {
        self.ensure_open()?;
        {
            let State::Write { buffer, forced, .. } = &mut self.state else {
                return Err(CoreError::invalid_operation("file not open for writing"));
            };
            if *forced {
                return Err(CoreError::invalid_operation(
                    "cannot write: final flush already done",
                ));
            }
            buffer.extend_from_slice(data);
            self.pos += data.len() as u64;
        }
        if self.buffered() >= self.block_size as usize {
            self.flush(false)?;
        }
        Ok(data.len())
    }

    fn buffered(&self) -> usize {
        match &self.state {
            State::Write { buffer, .. } => buffer.len(),
            State::Read { .. } => 0,
        }
    }

    /// Uploads buffered data.
    ///
    /// Without `force`, full blocks are uploaded and the remainder is
    /// retained; a buffer of exactly one block is held back so the final
    /// chunk is never empty. With `force` (used by `close`), everything
    /// is uploaded, the last chunk is marked final and the file moves to
    /// the staged state; it accepts no more writes, and repeating the
    /// forced flush is a no-op rather than a second upload.
    ///
    /// # Errors
    ///
    /// Returns an error if an upload fails; buffered data is retained and
    /// the file stays writable-or-retryable.
    pub fn flush(&mut self, force: bool) -> CoreResult<()> {
        let block_size = self.block_size as usize;
        let path = self.path.clone();
        let State::Write {
            target,
            buffer,
            uploaded,
            initiated,
            forced,
            write_state,
        } = &mut self.state
        else {
            return Ok(()); // read-mode flush is a no-op
        };
        if matches!(*write_state, WriteState::Committed | WriteState::Discarded) {
            return Err(CoreError::invalid_operation("file already finalized"));
        }
        if *forced {
            // Final flush already succeeded; nothing is buffered. A
            // close retried after a commit failure comes through here.
            return Ok(());
        }
        if !force && buffer.len() < block_size {
            return Ok(());
        }

        if !*initiated {
            target.initiate()?;
            *initiated = true;
        }

        // Full blocks first; on a plain flush keep at least the last
        // block so the closing chunk always carries data.
        while buffer.len() > block_size {
            target.upload_chunk(&buffer[..block_size], false)?;
            *uploaded += block_size as u64;
            buffer.drain(..block_size);
        }

        if force {
            if !buffer.is_empty() || *uploaded > 0 {
                target.upload_chunk(buffer, true)?;
                *uploaded += buffer.len() as u64;
                buffer.clear();
            }
            *forced = true;
            *write_state = WriteState::Staged;
            debug!(path = %path, uploaded = *uploaded, "final flush complete");
        }
        Ok(())
    }

    /// Closes the file. Idempotent.
    ///
    /// Read mode discards the cache strategy. Write mode performs the
    /// final flush, then commits (autocommit) or stages the upload for a
    /// [`crate::Transaction`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or commit fails; the file then
    /// remains open and un-committed. A flush that already succeeded
    /// survives a commit failure: the upload stays staged, so a retried
    /// `close` (or an explicit [`commit`](Self::commit) or
    /// [`discard`](Self::discard)) finishes the job without re-uploading.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        match &mut self.state {
            State::Read { cache, .. } => {
                *cache = None;
                self.closed = true;
                Ok(())
            }
            State::Write { .. } => {
                self.flush(true)?;
                let autocommit = self.autocommit;
                let State::Write {
                    target,
                    write_state,
                    ..
                } = &mut self.state
                else {
                    unreachable!("mode cannot change");
                };
                if autocommit {
                    target.commit()?;
                    *write_state = WriteState::Committed;
                } else {
                    debug!(path = %self.path, "upload staged for transaction");
                }
                self.closed = true;
                Ok(())
            }
        }
    }

    /// Finalizes a staged upload.
    ///
    /// # Errors
    ///
    /// Returns an error unless the file is in the staged state, or if the
    /// backend commit fails.
    pub fn commit(&mut self) -> CoreResult<()> {
        let State::Write {
            target,
            write_state,
            ..
        } = &mut self.state
        else {
            return Err(CoreError::invalid_operation("cannot commit a read-mode file"));
        };
        if *write_state != WriteState::Staged {
            return Err(CoreError::invalid_operation(format!(
                "cannot commit from state {write_state:?}"
            )));
        }
        target.commit()?;
        *write_state = WriteState::Committed;
        Ok(())
    }

    /// Throws away a staged upload.
    ///
    /// # Errors
    ///
    /// Returns an error unless the file is in the staged state, or if the
    /// backend discard fails.
    pub fn discard(&mut self) -> CoreResult<()> {
        let State::Write {
            target,
            write_state,
            ..
        } = &mut self.state
        else {
            return Err(CoreError::invalid_operation(
                "cannot discard a read-mode file",
            ));
        };
        if *write_state != WriteState::Staged {
            return Err(CoreError::invalid_operation(format!(
                "cannot discard from state {write_state:?}"
            )));
        }
        target.discard()?;
        *write_state = WriteState::Discarded;
        Ok(())
    }

    /// An already-closed stand-in used when moving a file out of a
    /// wrapper that implements `Drop`.
    pub(crate) fn placeholder() -> Self {
        Self {
            path: String::new(),
            mode: FileMode::Read,
            block_size: DEFAULT_BLOCK_SIZE,
            pos: 0,
            closed: true,
            autocommit: true,
            state: State::Read {
                cache: None,
                size: Some(0),
            },
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.closed {
            Err(CoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for BufferedFile {
    fn drop(&mut self) {
        if !self.closed {
            if let State::Write { buffer, .. } = &self.state {
                if !buffer.is_empty() {
                    warn!(
                        path = %self.path,
                        buffered = buffer.len(),
                        "write file dropped without close; buffered data lost"
                    );
                }
            }
        }
    }
}

impl io::Read for BufferedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = BufferedFile::read(self, buf.len()).map_err(io::Error::other)?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Seek for BufferedFile {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        BufferedFile::seek(self, from).map_err(io::Error::other)
    }
}

impl io::Write for BufferedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BufferedFile::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        BufferedFile::flush(self, false).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangecache_backend::{MemoryFetcher, MemoryUpload};

    fn read_file(data: &[u8], block_size: u64, cache_type: &str) -> BufferedFile {
        let fetcher: Arc<dyn RangeFetcher> = Arc::new(MemoryFetcher::new(data.to_vec()));
        BufferedFile::open_read(
            "mem://test",
            fetcher,
            FileOptions::new()
                .block_size(block_size)
                .cache_type(cache_type),
        )
        .unwrap()
    }

    #[test]
    fn read_advances_position() {
        let mut file = read_file(b"0123456789", 4, "readahead");
        assert_eq!(file.read(4).unwrap(), b"0123");
        assert_eq!(file.tell(), 4);
        assert_eq!(file.read(4).unwrap(), b"4567");
        assert_eq!(file.read(100).unwrap(), b"89");
        assert!(file.read(1).unwrap().is_empty());
    }

    #[test]
    fn seek_is_cheap_and_random_access_works() {
        let mut file = read_file(b"0123456789", 4, "blockcache");
        file.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(file.read(2).unwrap(), b"89");
        file.seek(SeekFrom::Start(1)).unwrap();
        assert_eq!(file.read(3).unwrap(), b"123");
        file.seek(SeekFrom::Current(-2)).unwrap();
        assert_eq!(file.read(2).unwrap(), b"23");
    }

    #[test]
    fn seek_before_start_fails() {
        let mut file = read_file(b"0123456789", 4, "readahead");
        assert!(file.seek(SeekFrom::Current(-1)).is_err());
    }

    #[test]
    fn read_all_returns_remainder() {
        let mut file = read_file(b"0123456789", 4, "readahead");
        file.seek(SeekFrom::Start(3)).unwrap();
        assert_eq!(file.read_all().unwrap(), b"3456789");
    }

    #[test]
    fn read_mode_without_size_requires_compatible_strategy() {
        struct NoSize;
        impl RangeFetcher for NoSize {
            fn fetch(&self, start: u64, end: u64) -> rangecache_backend::BackendResult<Vec<u8>> {
                Ok(vec![0; (end - start) as usize])
            }
        }
        let fetcher: Arc<dyn RangeFetcher> = Arc::new(NoSize);

        let err = BufferedFile::open_read("s", Arc::clone(&fetcher), FileOptions::new());
        assert!(matches!(err, Err(CoreError::Config { .. })));

        let ok = BufferedFile::open_read(
            "s",
            fetcher,
            FileOptions::new().cache_type("none").block_size(4),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn read_line_scans_in_block_steps() {
        let mut file = read_file(b"alpha\nbeta\ngamma", 4, "readahead");
        assert_eq!(file.read_line().unwrap(), b"alpha\n");
        assert_eq!(file.read_line().unwrap(), b"beta\n");
        assert_eq!(file.read_line().unwrap(), b"gamma");
        assert!(file.read_line().unwrap().is_empty());
    }

    #[test]
    fn read_until_positions_after_delimiter() {
        let mut file = read_file(b"aa|bb|cc", 3, "readahead");
        assert_eq!(file.read_until(b'|', None).unwrap(), b"aa|");
        assert_eq!(file.tell(), 3);
        assert_eq!(file.read_until(b'|', Some(2)).unwrap(), b"bb|");
        assert_eq!(file.read_all().unwrap(), b"cc");
    }

    #[test]
    fn write_buffers_until_block_size() {
        let upload = MemoryUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(4),
        );

        file.write(b"ab").unwrap();
        file.write(b"cd").unwrap();
        // Exactly one block buffered: held back for the final chunk
        assert!(state.lock().chunks.is_empty());

        file.write(b"ef").unwrap();
        // Crossed the block size: one block-sized chunk uploaded
        assert_eq!(state.lock().chunks.len(), 1);
        assert_eq!(state.lock().chunks[0].0, b"abcd");
        assert!(!state.lock().chunks[0].1);
    }

    #[test]
    fn round_trip_chunk_count_and_final_flag() {
        let data: Vec<u8> = (0..23u8).collect();
        let upload = MemoryUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(5),
        );

        for piece in data.chunks(3) {
            file.write(piece).unwrap();
        }
        file.close().unwrap();

        let state = state.lock();
        // ceil(23 / 5) upload calls, concatenating to the input
        assert_eq!(state.chunks.len(), 5);
        assert_eq!(state.joined(), data);
        let finals: Vec<bool> = state.chunks.iter().map(|(_, f)| *f).collect();
        assert_eq!(finals, vec![false, false, false, false, true]);
        assert!(state.committed);
    }

    #[test]
    fn exact_multiple_of_block_size_keeps_final_nonempty() {
        let upload = MemoryUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(4),
        );
        file.write(&[9u8; 8]).unwrap();
        file.close().unwrap();

        let state = state.lock();
        assert_eq!(state.chunks.len(), 2);
        assert_eq!(state.chunks[0].0.len(), 4);
        assert_eq!(state.chunks[1].0.len(), 4);
        assert_eq!(
            state.chunks.iter().map(|(_, f)| *f).collect::<Vec<_>>(),
            vec![false, true]
        );
    }

    #[test]
    fn empty_write_file_uploads_nothing_but_commits() {
        let upload = MemoryUpload::new();
        let state = upload.state();
        let mut file =
            BufferedFile::open_write("mem://out", Box::new(upload), FileOptions::new());
        file.close().unwrap();

        let state = state.lock();
        assert!(state.chunks.is_empty());
        assert!(state.committed);
    }

    #[test]
    fn close_is_idempotent() {
        let upload = MemoryUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(4),
        );
        file.write(b"xyz").unwrap();
        file.close().unwrap();
        file.close().unwrap();

        assert_eq!(state.lock().chunks.len(), 1);
        assert!(file.is_closed());
    }

    #[test]
    fn write_after_close_fails() {
        let mut file =
            BufferedFile::open_write("mem://out", Box::new(MemoryUpload::new()), FileOptions::new());
        file.close().unwrap();
        assert!(matches!(file.write(b"late"), Err(CoreError::Closed)));
    }

    #[test]
    fn seek_on_write_file_fails() {
        let mut file =
            BufferedFile::open_write("mem://out", Box::new(MemoryUpload::new()), FileOptions::new());
        assert!(file.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn failed_final_flush_leaves_file_uncommitted() {
        let upload = rangecache_backend::FlakyUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(4),
        );
        file.write(b"abc").unwrap();

        assert!(file.close().is_err());
        assert!(!file.is_closed());
        assert_eq!(file.write_state(), Some(WriteState::Open));
        assert!(!state.lock().committed);

        // The flaky target accepts the retry
        file.close().unwrap();
        assert!(state.lock().committed);
        assert_eq!(state.lock().joined(), b"abc");
    }

    #[test]
    fn failed_commit_leaves_file_staged_for_retry() {
        let upload = rangecache_backend::FlakyCommitUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(4),
        );
        file.write(b"abc").unwrap();

        assert!(file.close().is_err());
        assert!(!file.is_closed());
        // The flushed upload is staged, not lost
        assert_eq!(file.write_state(), Some(WriteState::Staged));
        assert!(!state.lock().committed);

        file.close().unwrap();
        assert!(file.is_closed());
        assert_eq!(file.write_state(), Some(WriteState::Committed));
        let state = state.lock();
        assert!(state.committed);
        // The retry re-commits without re-uploading
        assert_eq!(state.chunks.len(), 1);
        assert_eq!(state.joined(), b"abc");
    }

    #[test]
    fn failed_commit_can_be_discarded_instead() {
        let upload = rangecache_backend::FlakyCommitUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().block_size(4),
        );
        file.write(b"abc").unwrap();
        assert!(file.close().is_err());

        file.discard().unwrap();
        assert_eq!(file.write_state(), Some(WriteState::Discarded));
        assert!(state.lock().discarded);
        assert!(!state.lock().committed);
    }

    #[test]
    fn autocommit_off_stages_for_later_commit() {
        let upload = MemoryUpload::new();
        let state = upload.state();
        let mut file = BufferedFile::open_write(
            "mem://out",
            Box::new(upload),
            FileOptions::new().autocommit(false),
        );
        file.write(b"staged").unwrap();
        file.close().unwrap();

        assert_eq!(file.write_state(), Some(WriteState::Staged));
        assert!(!state.lock().committed);

        file.commit().unwrap();
        assert_eq!(file.write_state(), Some(WriteState::Committed));
        assert!(state.lock().committed);
    }

    #[test]
    fn append_mode_positions_at_existing_size() {
        let upload = MemoryUpload::new();
        let mut file = BufferedFile::open_append(
            "mem://out",
            Box::new(upload),
            FileOptions::new().size(100),
        )
        .unwrap();
        assert_eq!(file.tell(), 100);
        assert_eq!(file.mode(), FileMode::Append);
        file.write(b"more").unwrap();
        assert_eq!(file.tell(), 104);
    }

    #[test]
    fn append_without_size_fails() {
        let result = BufferedFile::open_append(
            "mem://out",
            Box::new(MemoryUpload::new()),
            FileOptions::new(),
        );
        assert!(matches!(result, Err(CoreError::Config { .. })));
    }

    #[test]
    fn std_io_traits_delegate() {
        use std::io::{Read, Seek};
        let mut file = read_file(b"0123456789", 4, "blockcache");
        file.seek(SeekFrom::Start(2)).unwrap();
        let mut buf = [0u8; 4];
        let n = Read::read(&mut file, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"2345");
    }
}
