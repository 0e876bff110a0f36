//! Local-file backend implementations.

use crate::error::{BackendError, BackendResult};
use crate::fetch::RangeFetcher;
use crate::upload::UploadTarget;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A range fetcher over a local file.
///
/// Mostly used to exercise the cache layer against real I/O, and as the
/// reference for what a transport-backed fetcher must guarantee.
///
/// # Thread Safety
///
/// The fetcher is thread-safe; positioned reads are serialized on an
/// internal lock.
#[derive(Debug)]
pub struct FileFetcher {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileFetcher {
    /// Opens a fetcher over the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its size cannot be
    /// determined.
    pub fn open(path: &Path) -> BackendResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeFetcher for FileFetcher {
    fn fetch(&self, start: u64, end: u64) -> BackendResult<Vec<u8>> {
        if start > end || end > self.size {
            return Err(BackendError::RangeOutOfBounds {
                start,
                end,
                size: self.size,
            });
        }
        let len = (end - start) as usize;
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

/// An upload target that stages chunks into a `.part` file next to the
/// destination and renames it into place on commit.
///
/// The rename makes the object appear atomically under its final path;
/// discarding removes the staging file and leaves the destination
/// untouched.
#[derive(Debug)]
pub struct FileUpload {
    dest: PathBuf,
    staging: PathBuf,
    file: Option<File>,
    finalized: bool,
}

impl FileUpload {
    /// Creates an upload target for `dest`.
    #[must_use]
    pub fn new(dest: &Path) -> Self {
        let mut staging = dest.as_os_str().to_owned();
        staging.push(".part");
        Self {
            dest: dest.to_path_buf(),
            staging: PathBuf::from(staging),
            file: None,
            finalized: false,
        }
    }

    /// Returns the destination path.
    #[must_use]
    pub fn dest(&self) -> &Path {
        &self.dest
    }
}

impl UploadTarget for FileUpload {
    fn initiate(&mut self) -> BackendResult<()> {
        if let Some(parent) = self.dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.staging)?;
        self.file = Some(file);
        Ok(())
    }

    fn upload_chunk(&mut self, data: &[u8], final_chunk: bool) -> BackendResult<()> {
        if self.finalized {
            return Err(BackendError::UploadFinalized);
        }
        let file = self.file.as_mut().ok_or(BackendError::Closed)?;
        file.write_all(data)?;
        if final_chunk {
            file.sync_all()?;
            self.finalized = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.file = None;
        std::fs::rename(&self.staging, &self.dest)?;
        Ok(())
    }

    fn discard(&mut self) -> BackendResult<()> {
        self.file = None;
        if self.staging.exists() {
            std::fs::remove_file(&self.staging)?;
        }
        Ok(())
    }
}
