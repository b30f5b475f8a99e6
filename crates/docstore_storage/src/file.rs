//! OS-backed filesystem for persistent storage.

use crate::backend::{FileSystem, WritableFile};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// Permission bits for files created by the store (unix only).
pub const PERM_FILE: u32 = 0o600;

/// Permission bits for directories created by the store (unix only).
pub const PERM_DIR: u32 = 0o700;

/// A filesystem backed by the operating system.
///
/// # Durability
///
/// - `sync()` on a created file calls `File::sync_all()`
/// - `sync_dir()` fsyncs the directory on unix so renames and removals are
///   durable; on other platforms it is a no-op
///
/// # Example
///
/// ```no_run
/// use docstore_storage::{FileSystem, OsFileSystem};
/// use std::path::Path;
///
/// let fs = OsFileSystem::new();
/// let mut file = fs.create(Path::new("settings.json.tmp")).unwrap();
/// file.write(b"{}").unwrap();
/// file.sync().unwrap();
/// file.close().unwrap();
/// fs.rename(Path::new("settings.json.tmp"), Path::new("settings.json")).unwrap();
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl OsFileSystem {
    /// Creates the OS filesystem handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// A file created through [`OsFileSystem::create`].
#[derive(Debug)]
struct OsFile {
    file: File,
}

impl WritableFile for OsFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.file.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        // std reports no close errors; sync() already surfaced deferred
        // write failures.
        drop(self.file);
        Ok(())
    }
}

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(PERM_DIR);
        }
        builder.create(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(PERM_FILE);
        }
        let file = options.open(path)?;
        Ok(Box::new(OsFile { file }))
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    #[cfg(unix)]
    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        File::open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self, _dir: &Path) -> io::Result<()> {
        // NTFS journals metadata; there is no directory fsync to issue.
        Ok(())
    }
}
