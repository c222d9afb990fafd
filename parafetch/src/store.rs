//! Pre-sized output file with disjoint write views.
//!
//! The destination is created at its final length, so each worker writes its
//! bytes straight to their final position and no reassembly pass is needed.
//! Nothing is held in process memory beyond the worker's copy buffer.
//!
//! Each view owns its own file handle, opened on the first write and
//! positioned at the view's offset. Write failures such as a full disk come
//! back as [`StoreError::Write`] on the worker that hit them. A view is
//! synced and closed by [`StoreView::finish`] once its chunk is complete.
//!
//! # Disjointness
//!
//! [`OutputStore::views`] rejects overlapping or unordered ranges up front,
//! and a view refuses any write past its own end, so two views never touch
//! the same byte. Views borrow the store mutably, which also means the store
//! cannot be closed while any view is still alive.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

use crate::chunk::Chunk;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the output store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file or its parent directory could not be created.
    #[error("failed to create {}: {source}", path.display())]
    Create { path: PathBuf, source: io::Error },

    /// The file could not be sized.
    #[error("failed to size {} to {len} bytes: {source}", path.display())]
    Resize {
        path: PathBuf,
        len: u64,
        source: io::Error,
    },

    /// Bytes could not be written at `offset`.
    #[error("failed to write {} at offset {offset}: {source}", path.display())]
    Write {
        path: PathBuf,
        offset: u64,
        source: io::Error,
    },

    /// The file could not be synced to disk.
    #[error("failed to flush {}: {source}", path.display())]
    Flush { path: PathBuf, source: io::Error },

    /// A requested view overlaps another view or lies outside the file.
    #[error("invalid view [{start}, {end}): {reason}")]
    InvalidRange { start: u64, end: u64, reason: String },

    /// A write would run past the end of its view.
    #[error("write of {attempted} bytes at view offset {position} overflows view of {len} bytes at {offset}")]
    ViewOverflow {
        offset: u64,
        len: u64,
        position: u64,
        attempted: usize,
    },
}

impl StoreError {
    /// Returns true if the operating system refused the I/O.
    ///
    /// These failures affect the output as a whole, unlike an overflowing
    /// view which only says something about one response body.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Create { .. } | Self::Resize { .. } | Self::Write { .. } | Self::Flush { .. }
        )
    }
}

// =============================================================================
// Output Store
// =============================================================================

/// Destination file sized to the total content length.
#[derive(Debug)]
pub struct OutputStore {
    path: PathBuf,
    file: File,
    len: u64,
}

impl OutputStore {
    /// Create (or truncate) `path` and size it to exactly `len` bytes.
    pub fn create(path: impl AsRef<Path>, len: u64) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Create {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| StoreError::Create {
                path: path.clone(),
                source,
            })?;

        file.set_len(len).map_err(|source| StoreError::Resize {
            path: path.clone(),
            len,
            source,
        })?;

        debug!(path = %path.display(), len, "Created output store");

        Ok(Self { path, file, len })
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the output file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for a zero-length output.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A single view over `[offset, offset + len)`.
    pub fn view(&mut self, offset: u64, len: u64) -> Result<StoreView<'_>, StoreError> {
        let chunk = Chunk::new(0, offset, offset.saturating_add(len));
        let mut views = self.views(std::slice::from_ref(&chunk))?;
        Ok(views.remove(0))
    }

    /// One view per chunk, in the same order.
    ///
    /// The chunks must be sorted by offset, non-overlapping and inside the
    /// file; anything else is rejected with `InvalidRange`. No file handle is
    /// opened until a view is first written to.
    pub fn views(&mut self, chunks: &[Chunk]) -> Result<Vec<StoreView<'_>>, StoreError> {
        let mut previous_end = 0u64;
        for chunk in chunks {
            let reason = if chunk.start > chunk.end {
                Some("start is past end".to_string())
            } else if chunk.end > self.len {
                Some(format!("extends past file length {}", self.len))
            } else if chunk.start < previous_end {
                Some(format!("overlaps or precedes a view ending at {}", previous_end))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(StoreError::InvalidRange {
                    start: chunk.start,
                    end: chunk.end,
                    reason,
                });
            }
            previous_end = chunk.end;
        }

        let path = self.path.as_path();
        Ok(chunks
            .iter()
            .map(|chunk| StoreView::new(path, chunk.start, chunk.len()))
            .collect())
    }

    /// Sync the file to disk.
    pub fn close(self) -> Result<(), StoreError> {
        self.file.sync_all().map_err(|source| StoreError::Flush {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), len = self.len, "Closed output store");
        Ok(())
    }
}

// =============================================================================
// Store View
// =============================================================================

/// Sequential writer over one disjoint region of the output.
#[derive(Debug)]
pub struct StoreView<'a> {
    path: &'a Path,
    file: Option<File>,
    offset: u64,
    len: u64,
    position: u64,
}

impl<'a> StoreView<'a> {
    pub(crate) fn new(path: &'a Path, offset: u64, len: u64) -> Self {
        Self {
            path,
            file: None,
            offset,
            len,
            position: 0,
        }
    }

    /// Append `bytes` at the view's cursor.
    ///
    /// On a write error the cursor does not move.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        let end = self.position + bytes.len() as u64;
        if end > self.len {
            return Err(StoreError::ViewOverflow {
                offset: self.offset,
                len: self.len,
                position: self.position,
                attempted: bytes.len(),
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let at = self.offset + self.position;
        let write_err = |source| StoreError::Write {
            path: self.path.to_path_buf(),
            offset: at,
            source,
        };

        // A failed handle is dropped so the next write reopens at the cursor.
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open().map_err(write_err)?,
        };
        file.write_all(bytes).map_err(write_err)?;
        self.file = Some(file);

        self.position = end;
        Ok(())
    }

    fn open(&self) -> io::Result<File> {
        let mut file = OpenOptions::new().write(true).open(self.path)?;
        file.seek(SeekFrom::Start(self.offset + self.position))?;
        Ok(file)
    }

    /// Sync the view's bytes to disk and close its handle.
    ///
    /// A view that was never written to has nothing to sync.
    pub fn finish(&mut self) -> Result<(), StoreError> {
        if let Some(file) = self.file.take() {
            file.sync_data().map_err(|source| StoreError::Flush {
                path: self.path.to_path_buf(),
                source,
            })?;
            trace!(offset = self.offset, len = self.len, "Closed store view");
        }
        Ok(())
    }

    /// Absolute file offset of the view's first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the view in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for a zero-length view.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.position
    }

    /// Bytes still to be written.
    pub fn remaining(&self) -> u64 {
        self.len - self.position
    }
}
