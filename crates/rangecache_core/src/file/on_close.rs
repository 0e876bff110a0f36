//! Close-callback wrapper for buffered files.

use super::BufferedFile;
use crate::error::CoreResult;
use std::io::{self, SeekFrom};

/// A [`BufferedFile`] that runs a callback when it is closed.
///
/// Owners of shared resources use this to observe the end of a handle's
/// life, e.g. dropping a registry entry or releasing a lease. The
/// callback runs exactly once, after the inner close succeeds; a failed
/// close keeps it armed so a retry can still fire it.
pub struct OnClose<F: FnOnce()> {
    file: BufferedFile,
    callback: Option<F>,
}

impl<F: FnOnce()> OnClose<F> {
    /// Wraps `file`, arming `callback` for its close.
    pub fn new(file: BufferedFile, callback: F) -> Self {
        Self {
            file,
            callback: Some(callback),
        }
    }

    /// The wrapped file.
    #[must_use]
    pub fn file(&self) -> &BufferedFile {
        &self.file
    }

    /// The wrapped file, mutably.
    pub fn file_mut(&mut self) -> &mut BufferedFile {
        &mut self.file
    }

    /// Closes the inner file and fires the callback.
    ///
    /// Idempotent like [`BufferedFile::close`]; the callback fires only on
    /// the first successful close.
    ///
    /// # Errors
    ///
    /// Returns the inner close error; the callback stays armed.
    pub fn close(&mut self) -> CoreResult<()> {
        self.file.close()?;
        if let Some(callback) = self.callback.take() {
            callback();
        }
        Ok(())
    }

    /// Consumes the wrapper, returning the inner file without firing the
    /// callback.
    #[must_use]
    pub fn into_inner(mut self) -> BufferedFile {
        self.callback = None;
        // Cannot move a field out of a Drop type; swap in a closed
        // placeholder and skip our own drop glue.
        let file = std::mem::replace(&mut self.file, BufferedFile::placeholder());
        std::mem::forget(self);
        file
    }
}

impl<F: FnOnce()> Drop for OnClose<F> {
    fn drop(&mut self) {
        if self.callback.is_some() && self.file.close().is_ok() {
            if let Some(callback) = self.callback.take() {
                callback();
            }
        }
    }
}

impl<F: FnOnce()> io::Read for OnClose<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.file, buf)
    }
}

impl<F: FnOnce()> io::Write for OnClose<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.file, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.file)
    }
}

impl<F: FnOnce()> io::Seek for OnClose<F> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        io::Seek::seek(&mut self.file, from)
    }
}
