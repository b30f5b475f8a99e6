//! In-memory filesystem for testing.

use crate::backend::{FileSystem, WritableFile};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A failure the in-memory filesystem can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The next `n` reads fail with `PermissionDenied`.
    DenyReads(u32),
    /// Every created file accepts at most this many bytes in total; further
    /// writes report zero bytes written.
    WriteLimit(usize),
    /// Every created file accepts this many bytes, then writes fail.
    InterruptWriteAfter(usize),
    /// `WritableFile::sync` fails.
    FailSync,
    /// `WritableFile::close` fails.
    FailClose,
    /// `rename` fails and leaves both paths untouched.
    FailRename,
    /// `create_dir_all` fails.
    FailCreateDir,
    /// `file_len` reports this size regardless of the stored content.
    ReportedLen(u64),
}

#[derive(Debug, Default)]
struct Faults {
    deny_reads: u32,
    write_limit: Option<usize>,
    interrupt_after: Option<usize>,
    fail_sync: bool,
    fail_close: bool,
    fail_rename: bool,
    fail_create_dir: bool,
    reported_len: Option<u64>,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    faults: Faults,
    read_attempts: u32,
}

impl State {
    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.dirs.contains(parent),
            _ => true,
        }
    }

    fn add_dirs(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

fn injected(kind: io::ErrorKind, what: &str) -> io::Error {
    io::Error::new(kind, format!("injected fault: {what}"))
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

/// An in-memory filesystem.
///
/// Files written through [`FileSystem::create`] are visible at their path as
/// soon as bytes are written, so a partially written temporary file can be
/// observed the way it would be on disk. Directories are tracked explicitly:
/// creating a file or renaming onto a path whose parent was never created
/// fails with `NotFound`, like a real filesystem.
///
/// # Thread Safety
///
/// The filesystem is thread-safe and clones share the same state.
///
/// # Example
///
/// ```rust
/// use docstore_storage::{Fault, FileSystem, InMemoryFileSystem};
/// use std::path::Path;
///
/// let fs = InMemoryFileSystem::new();
/// fs.inject(Fault::DenyReads(1));
/// fs.insert("/etc/app.json", b"{}".to_vec());
///
/// assert!(fs.read(Path::new("/etc/app.json")).is_err());
/// assert!(fs.read(Path::new("/etc/app.json")).is_ok());
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryFileSystem {
    state: Arc<Mutex<State>>,
}

impl InMemoryFileSystem {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` at `path`, creating parent directories as needed.
    pub fn insert(&self, path: impl AsRef<Path>, data: Vec<u8>) {
        let path = path.as_ref();
        let mut state = self.state.lock();
        if let Some(parent) = path.parent() {
            state.add_dirs(parent);
        }
        state.files.insert(path.to_path_buf(), data);
    }

    /// Returns a copy of the file at `path`, if any.
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.state.lock().files.get(path.as_ref()).cloned()
    }

    /// Returns true if a file exists at `path`.
    #[must_use]
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().files.contains_key(path.as_ref())
    }

    /// Returns true if a directory exists at `path`.
    #[must_use]
    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().dirs.contains(path.as_ref())
    }

    /// Returns the paths of all files, in sorted order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Returns how many times `read` has been called.
    #[must_use]
    pub fn read_attempts(&self) -> u32 {
        self.state.lock().read_attempts
    }

    /// Arms a fault. Faults stay armed until [`Self::clear_faults`], except
    /// [`Fault::DenyReads`] which counts down.
    pub fn inject(&self, fault: Fault) {
        let mut state = self.state.lock();
        let faults = &mut state.faults;
        match fault {
            Fault::DenyReads(n) => faults.deny_reads = n,
            Fault::WriteLimit(n) => faults.write_limit = Some(n),
            Fault::InterruptWriteAfter(n) => faults.interrupt_after = Some(n),
            Fault::FailSync => faults.fail_sync = true,
            Fault::FailClose => faults.fail_close = true,
            Fault::FailRename => faults.fail_rename = true,
            Fault::FailCreateDir => faults.fail_create_dir = true,
            Fault::ReportedLen(n) => faults.reported_len = Some(n),
        }
    }

    /// Disarms every fault.
    pub fn clear_faults(&self) {
        self.state.lock().faults = Faults::default();
    }
}

/// A file created through [`InMemoryFileSystem::create`].
#[derive(Debug)]
struct MemoryFile {
    state: Arc<Mutex<State>>,
    path: PathBuf,
    written: usize,
}

impl WritableFile for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let mut n = buf.len();

        if let Some(after) = state.faults.interrupt_after {
            if self.written >= after {
                return Err(injected(io::ErrorKind::Other, "write interrupted"));
            }
            n = n.min(after - self.written);
        }
        if let Some(limit) = state.faults.write_limit {
            n = n.min(limit.saturating_sub(self.written));
        }

        let file = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        file.extend_from_slice(&buf[..n]);
        self.written += n;
        Ok(n)
    }

    fn sync(&mut self) -> io::Result<()> {
        if self.state.lock().faults.fail_sync {
            return Err(injected(io::ErrorKind::Other, "sync failed"));
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        if self.state.lock().faults.fail_close {
            return Err(injected(io::ErrorKind::Other, "close failed"));
        }
        Ok(())
    }
}

impl FileSystem for InMemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.read_attempts += 1;
        if state.faults.deny_reads > 0 {
            state.faults.deny_reads -= 1;
            return Err(injected(io::ErrorKind::PermissionDenied, "read denied"));
        }
        state.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.faults.fail_create_dir {
            return Err(injected(io::ErrorKind::PermissionDenied, "mkdir failed"));
        }
        state.add_dirs(path);
        Ok(())
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let mut state = self.state.lock();
        if !state.parent_exists(path) {
            return Err(not_found(path));
        }
        state.files.insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemoryFile {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            written: 0,
        }))
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        let state = self.state.lock();
        let file = state.files.get(path).ok_or_else(|| not_found(path))?;
        Ok(state.faults.reported_len.unwrap_or(file.len() as u64))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.faults.fail_rename {
            return Err(injected(io::ErrorKind::Other, "rename failed"));
        }
        if !state.parent_exists(to) {
            return Err(not_found(to));
        }
        let data = state.files.remove(from).ok_or_else(|| not_found(from))?;
        state.files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.state
            .lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn sync_dir(&self, _dir: &Path) -> io::Result<()> {
        // Nothing is buffered.
        Ok(())
    }
}
