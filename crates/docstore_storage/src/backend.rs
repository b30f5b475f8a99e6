//! Filesystem trait definition.

use std::io;
use std::path::Path;
use tracing::debug;

/// A file opened for writing by [`FileSystem::create`].
///
/// Writes are reported exactly as the backend performed them: a `write` may
/// accept fewer bytes than offered, and the caller is expected to check.
pub trait WritableFile: Send {
    /// Writes a prefix of `buf`, returning the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Forces written data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> io::Result<()>;

    /// Closes the file, surfacing any error the close reports.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend reports a failure on close.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The blocking filesystem operations the document store relies on.
///
/// Implementations must preserve the [`io::ErrorKind`] of failures: the store
/// distinguishes `NotFound` and `PermissionDenied` from every other error.
///
/// # Invariants
///
/// - `rename` replaces `to` in a single step; readers of `to` see either the
///   old or the new content
/// - `create` truncates an existing file
/// - Backends must be `Send + Sync` so a store can be shared across threads
///
/// # Implementors
///
/// - [`super::OsFileSystem`] - For persistent storage
/// - [`super::InMemoryFileSystem`] - For testing
pub trait FileSystem: Send + Sync {
    /// Reads the whole file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the open or read error unchanged.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Creates `path` and any missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Opens `path` write-only, creating it if missing and truncating it if not.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>>;

    /// Returns the on-disk size of `path` in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Atomically renames `from` onto `to`, replacing `to` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails. `from` is left untouched.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed, including when it
    /// does not exist.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Makes directory entry changes in `dir` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be synced.
    fn sync_dir(&self, dir: &Path) -> io::Result<()>;
}

/// Ensures the parent directory chain of `path` exists.
///
/// A path without a parent component (a bare file name) needs nothing.
///
/// # Errors
///
/// Returns the directory creation error unchanged.
pub fn make_parent_dirs(fs: &dyn FileSystem, path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            debug!(dir = %parent.display(), "making parent directories");
            fs.create_dir_all(parent)
        }
        _ => Ok(()),
    }
}
