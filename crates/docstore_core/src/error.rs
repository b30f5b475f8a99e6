//! Error types for docstore core.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The filesystem operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    /// Opening or reading the backing file.
    Read,
    /// Creating a directory chain.
    CreateDir,
    /// Opening a temporary file for writing.
    Create,
    /// Writing encoded bytes.
    Write,
    /// Flushing a written file to durable storage.
    Sync,
    /// Closing a written file.
    Close,
    /// Reading file metadata.
    Stat,
    /// Renaming a temporary file into place.
    Rename,
    /// Removing a file.
    Remove,
    /// Syncing a directory after a rename.
    SyncDir,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::CreateDir => "create directory",
            Self::Create => "open for writing",
            Self::Write => "write",
            Self::Sync => "sync",
            Self::Close => "close",
            Self::Stat => "stat",
            Self::Rename => "rename",
            Self::Remove => "remove",
            Self::SyncDir => "sync directory",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while loading or saving a document file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem call failed.
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        /// The operation that failed.
        op: IoOp,
        /// The path the operation was applied to.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The file has content that is not a JSON object.
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        /// The file that was read.
        path: PathBuf,
        /// The decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory document could not be encoded.
    #[error("failed to encode {label} document: {source}")]
    Encode {
        /// Label of the store.
        label: String,
        /// The encoder error.
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory document root is neither an object nor absent.
    #[error("{label} document root must be an object, found {found}")]
    InvalidDocument {
        /// Label of the store.
        label: String,
        /// The JSON type found at the root.
        found: &'static str,
    },

    /// Fewer bytes were written than were encoded.
    #[error("short write to {}: wrote {written} bytes, expected {expected}", path.display())]
    ShortWrite {
        /// The file being written.
        path: PathBuf,
        /// Bytes accepted by the filesystem.
        written: usize,
        /// Bytes that should have been written.
        expected: usize,
    },

    /// The written file's on-disk size differs from the encoded length.
    #[error("{} is {on_disk} bytes on disk, expected {expected}", path.display())]
    SizeMismatch {
        /// The file that was verified.
        path: PathBuf,
        /// Size reported by the filesystem.
        on_disk: u64,
        /// Encoded length.
        expected: u64,
    },

    /// A transaction is already active on this store.
    #[error("transaction already in progress for {}", path.display())]
    TransactionInProgress {
        /// The store's backing file.
        path: PathBuf,
    },
}

impl StoreError {
    /// Creates an I/O error for `op` on `path`.
    pub fn io(op: IoOp, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns true if this is an I/O error of kind `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Returns true if this is a short write.
    #[must_use]
    pub fn is_short_write(&self) -> bool {
        matches!(self, Self::ShortWrite { .. })
    }

    /// Returns the failed operation for I/O errors.
    #[must_use]
    pub fn io_op(&self) -> Option<IoOp> {
        match self {
            Self::Io { op, .. } => Some(*op),
            _ => None,
        }
    }
}
