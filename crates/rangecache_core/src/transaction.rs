//! Deferred-commit grouping of write files.

use crate::error::{CoreError, CoreResult};
use crate::file::{BufferedFile, WriteState};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// A group of staged uploads committed or discarded together.
///
/// Files opened with autocommit off end up staged after close instead of
/// visible; handing them to a transaction defers the decision. On
/// [`complete`](Self::complete) with success every staged file is
/// committed in the order it was enqueued, so later objects never become
/// visible before earlier ones; on failure every file is discarded.
///
/// The transaction takes ownership of its files, which is what rules out
/// one file being completed by two transactions.
///
/// This is deferral, not atomicity: a backend error mid-commit leaves
/// earlier files committed while the failing file and everything after
/// it are discarded, so no staged upload is left dangling. The error
/// names how far the commit got.
pub struct Transaction {
    files: VecDeque<BufferedFile>,
}

impl Transaction {
    /// Creates an empty transaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: VecDeque::new(),
        }
    }

    /// Number of files enqueued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the transaction holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Takes ownership of a closed, staged file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is not in the staged state.
    pub fn push(&mut self, file: BufferedFile) -> CoreResult<()> {
        if file.write_state() != Some(WriteState::Staged) {
            return Err(CoreError::invalid_operation(format!(
                "transaction accepts staged files only, got {:?}",
                file.write_state()
            )));
        }
        debug!(path = file.path(), "file joined transaction");
        self.files.push_back(file);
        Ok(())
    }

    /// Completes the transaction: commits every file in enqueue order on
    /// success, discards every file on failure.
    ///
    /// # Errors
    ///
    /// Propagates the first backend error. When a commit fails, files
    /// before the failure stay committed; the failing file and every
    /// file after it are discarded.
    pub fn complete(mut self, success: bool) -> CoreResult<()> {
        if success {
            while let Some(mut file) = self.files.pop_front() {
                if let Err(err) = file.commit() {
                    warn!(path = file.path(), %err, "commit failed, discarding the rest");
                    let _ = file.discard();
                    let _ = self.discard_all();
                    return Err(err);
                }
            }
            Ok(())
        } else {
            self.discard_all()
        }
    }

    fn discard_all(&mut self) -> CoreResult<()> {
        let mut first_err = None;
        while let Some(mut file) = self.files.pop_front() {
            if let Err(err) = file.discard() {
                warn!(path = file.path(), %err, "discard failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.files.is_empty() {
            warn!(
                files = self.files.len(),
                "transaction dropped without complete; discarding"
            );
            let _ = self.discard_all();
        }
    }
}
