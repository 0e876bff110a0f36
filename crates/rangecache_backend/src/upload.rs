//! Chunked-upload trait definition.

use crate::error::BackendResult;

/// A destination for a forward-only chunked upload.
///
/// A buffered write file pushes block-sized chunks here as its buffer
/// fills, then marks the last chunk `final`. After the final chunk the
/// target is either committed (object becomes durably visible under its
/// path) or discarded (partial upload thrown away).
///
/// # State
///
/// `initiate` must be called before the first chunk. After a chunk with
/// `final = true`, further `upload_chunk` calls are an error. `commit` and
/// `discard` are terminal.
///
/// # Implementors
///
/// - [`super::MemoryUpload`] - For testing
/// - [`super::FileUpload`] - Stages to a `.part` file, renames on commit
pub trait UploadTarget: Send {
    /// Prepares the remote side for an upload (e.g. creates a multipart
    /// upload or a staging file).
    ///
    /// # Errors
    ///
    /// Returns an error if the upload cannot be started.
    fn initiate(&mut self) -> BackendResult<()>;

    /// Uploads one chunk.
    ///
    /// `final_chunk` marks the last piece of the object; the target may use
    /// it to complete a multipart protocol. A timed-out or abandoned chunk
    /// may still land server-side; callers must treat "caller gave up" and
    /// "upload reverted" as different things.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or the upload was already
    /// finalized.
    fn upload_chunk(&mut self, data: &[u8], final_chunk: bool) -> BackendResult<()>;

    /// Makes the uploaded object durably visible under its target path.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails; the upload stays staged.
    fn commit(&mut self) -> BackendResult<()>;

    /// Throws away the staged upload.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup fails.
    fn discard(&mut self) -> BackendResult<()>;
}
