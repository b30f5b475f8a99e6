//! The JSON document file.

use crate::config::StoreConfig;
use crate::error::{IoOp, StoreError, StoreResult};
use crate::transaction::{temp_path_for, Transaction};
use docstore_storage::{make_parent_dirs, FileSystem, OsFileSystem, WritableFile};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// What [`JsonFile::load`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// The file was read and decoded.
    Loaded,
    /// No file exists at the path; the document is empty.
    Missing,
    /// Every attempt to open the file was denied; the document is empty.
    ///
    /// The call still succeeds so the application can run on defaults, but
    /// whatever configuration is on disk was not read.
    PermissionDenied {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// A dictionary-shaped JSON document mirrored to a file.
///
/// `load` reads the file into memory; callers then read and mutate the
/// document through the accessors and persist it with `save`. Every save is
/// written to a sibling temporary file, synced, and renamed over the backing
/// file, so readers of the path see either the old or the new document.
///
/// At most one [`Transaction`] is active per store. `save` joins the active
/// one if the caller began it explicitly, and otherwise runs inside an
/// implicit transaction that it commits or aborts before returning.
///
/// # Thread Safety
///
/// `JsonFile` is `Send + Sync`. The active-transaction slot is guarded by a
/// mutex, and a writer lock serializes every save, commit and abort, so a
/// save on one thread never writes into another thread's implicit
/// transaction. Concurrent edits to the document are serialized by a lock
/// but their ordering relative to saves is up to the caller.
///
/// # Example
///
/// ```rust
/// use docstore_core::{JsonFile, LoadStatus};
/// use serde_json::json;
///
/// let dir = tempfile::tempdir()?;
/// let store = JsonFile::new(dir.path().join("config.json"), "config");
///
/// assert_eq!(store.load(false)?, LoadStatus::Missing);
/// store.set("user", json!({ "name": "max" }));
/// store.save()?;
///
/// let reopened = JsonFile::new(dir.path().join("config.json"), "config");
/// assert_eq!(reopened.load(true)?, LoadStatus::Loaded);
/// assert_eq!(reopened.get("user"), Some(json!({ "name": "max" })));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct JsonFile {
    path: PathBuf,
    label: String,
    fs: Arc<dyn FileSystem>,
    config: StoreConfig,
    document: RwLock<Value>,
    exists: AtomicBool,
    tx: Mutex<Option<Slot>>,
    /// Held from the first byte written to a temp file until it is renamed
    /// or removed.
    writer: Mutex<()>,
}

/// The active transaction and who owns it.
#[derive(Debug)]
enum Slot {
    /// Begun by [`JsonFile::begin_transaction`]; saves join it.
    Explicit(PathBuf),
    /// Owned by a single `save` call; never joined.
    Implicit(PathBuf),
}

impl fmt::Debug for JsonFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFile")
            .field("path", &self.path)
            .field("label", &self.label)
            .field("config", &self.config)
            .field("exists", &self.exists())
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl JsonFile {
    /// Creates a store for `path` on the OS filesystem. No I/O is performed.
    ///
    /// `label` names the kind of document in log messages.
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self::with_config(path, label, StoreConfig::default())
    }

    /// Creates a store with a custom configuration.
    pub fn with_config(
        path: impl Into<PathBuf>,
        label: impl Into<String>,
        config: StoreConfig,
    ) -> Self {
        Self::with_fs(path, label, Arc::new(OsFileSystem::new()), config)
    }

    /// Creates a store on an arbitrary filesystem.
    pub fn with_fs(
        path: impl Into<PathBuf>,
        label: impl Into<String>,
        fs: Arc<dyn FileSystem>,
        config: StoreConfig,
    ) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            fs,
            config,
            document: RwLock::new(Value::Object(Map::new())),
            exists: AtomicBool::new(false),
            tx: Mutex::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the diagnostic label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns true once a `load` has found the file on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists.load(Ordering::Acquire)
    }

    /// Returns true while a transaction is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.lock().is_some()
    }

    // ── Document access ─────────────────────────────────────────────────────

    /// Returns a copy of the document.
    #[must_use]
    pub fn document(&self) -> Value {
        self.document.read().clone()
    }

    /// Runs `f` with shared access to the document.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.document.read())
    }

    /// Runs `f` with exclusive access to the document.
    ///
    /// Setting the document to `Value::Null` marks it absent; `save` then
    /// writes an empty object.
    ///
    /// The document lock is held while `f` runs and is not reentrant: calling
    /// `get`, `document`, `set`, `save` or any other accessor of this store
    /// from inside `f` deadlocks.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.document.write())
    }

    /// Replaces the whole document.
    pub fn set_document(&self, document: Value) {
        *self.document.write() = document;
    }

    /// Returns a copy of the top-level value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.document.read().get(key).cloned()
    }

    /// Stores `value` under `key`, returning the previous value.
    ///
    /// A document whose root is not an object (including the absent `Null`
    /// document) is replaced by an empty object first.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let mut document = self.document.write();
        if !document.is_object() {
            *document = Value::Object(Map::new());
        }
        document
            .as_object_mut()
            .and_then(|map| map.insert(key.into(), value.into()))
    }

    /// Removes the top-level value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.document
            .write()
            .as_object_mut()
            .and_then(|map| map.remove(key))
    }

    // ── Load / nuke ─────────────────────────────────────────────────────────

    /// Loads the backing file into memory.
    ///
    /// A missing file is not an error: the document is reset to empty,
    /// `exists()` becomes false, and the condition is logged at warn level if
    /// `warn_if_missing` is set (debug otherwise). Permission denial is
    /// retried `permission_retries` times; if every attempt is denied the
    /// document is reset to empty and [`LoadStatus::PermissionDenied`] is
    /// returned. An empty or all-whitespace file loads as an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] for any other open or read error, and
    /// [`StoreError::Decode`] if the content is not a JSON object.
    pub fn load(&self, warn_if_missing: bool) -> StoreResult<LoadStatus> {
        let max_attempts = self.config.permission_retries.max(1);
        let mut attempt = 0;

        let data = loop {
            attempt += 1;
            debug!(label = %self.label, path = %self.path.display(), attempt, "loading file");

            match self.fs.read(&self.path) {
                Ok(data) => break data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if warn_if_missing {
                        warn!(label = %self.label, path = %self.path.display(), "no file found");
                    } else {
                        debug!(label = %self.label, path = %self.path.display(), "no file found");
                    }
                    self.reset_empty();
                    return Ok(LoadStatus::Missing);
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    warn!(
                        label = %self.label,
                        path = %self.path.display(),
                        attempt,
                        "permission denied opening file"
                    );
                    if attempt >= max_attempts {
                        error!(
                            label = %self.label,
                            path = %self.path.display(),
                            attempts = attempt,
                            "giving up on unreadable file; continuing with an empty document"
                        );
                        self.reset_empty();
                        return Ok(LoadStatus::PermissionDenied { attempts: attempt });
                    }
                    thread::sleep(self.config.permission_retry_delay);
                }
                Err(e) => return Err(StoreError::io(IoOp::Read, &self.path, e)),
            }
        };

        self.exists.store(true, Ordering::Release);

        let map = decode(&data).map_err(|source| {
            error!(label = %self.label, path = %self.path.display(), %source, "error decoding file");
            StoreError::Decode {
                path: self.path.clone(),
                source,
            }
        })?;
        *self.document.write() = Value::Object(map);

        debug!(label = %self.label, "loaded file");
        Ok(LoadStatus::Loaded)
    }

    /// Deletes the backing file outright. Not transactional.
    ///
    /// # Errors
    ///
    /// Returns the removal error unchanged, including `NotFound` when the
    /// file is already gone (see [`StoreError::is_not_found`]).
    pub fn nuke(&self) -> StoreResult<()> {
        debug!(label = %self.label, path = %self.path.display(), "nuking file");
        let result = self.fs.remove_file(&self.path);
        debug!(label = %self.label, ok = result.is_ok(), "nuke finished");
        result.map_err(|e| StoreError::io(IoOp::Remove, &self.path, e))?;
        self.exists.store(false, Ordering::Release);
        Ok(())
    }

    fn reset_empty(&self) {
        self.exists.store(false, Ordering::Release);
        *self.document.write() = Value::Object(Map::new());
    }

    // ── Transactions ────────────────────────────────────────────────────────

    /// Begins an explicit transaction.
    ///
    /// Subsequent `save` calls write into the transaction's temporary file
    /// until it is committed or aborted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransactionInProgress`] if a transaction is
    /// already active; the active one is not affected.
    pub fn begin_transaction(&self) -> StoreResult<Transaction<'_>> {
        let mut slot = self.tx.lock();
        if slot.is_some() {
            return Err(StoreError::TransactionInProgress {
                path: self.path.clone(),
            });
        }
        let temp_path = temp_path_for(&self.path);
        debug!(label = %self.label, tmp = %temp_path.display(), "began transaction");
        *slot = Some(Slot::Explicit(temp_path.clone()));
        Ok(Transaction::new(self, temp_path))
    }

    /// Writes the document to disk.
    ///
    /// Inside an explicit transaction this only writes the temporary file.
    /// Otherwise the write runs in an implicit transaction that is committed
    /// on success; on any failure its temporary file is removed and the
    /// error returned. Concurrent saves wait for each other.
    ///
    /// # Errors
    ///
    /// Returns the first failure of the write or the commit.
    pub fn save(&self) -> StoreResult<()> {
        let _writer = self.writer.lock();

        let (temp_path, implicit) = {
            let mut slot = self.tx.lock();
            match slot.as_ref() {
                Some(Slot::Explicit(temp_path)) => (temp_path.clone(), false),
                // Implicit transactions only exist while the writer lock is held.
                Some(Slot::Implicit(_)) => {
                    return Err(StoreError::TransactionInProgress {
                        path: self.path.clone(),
                    })
                }
                None => {
                    let temp_path = temp_path_for(&self.path);
                    *slot = Some(Slot::Implicit(temp_path.clone()));
                    (temp_path, true)
                }
            }
        };

        if !implicit {
            return self.write_temp(&temp_path);
        }

        let result = self
            .write_temp(&temp_path)
            .and_then(|()| self.rename_into_place(&temp_path));
        if let Err(e) = &result {
            debug!(label = %self.label, tmp = %temp_path.display(), %e, "implicit save failed");
            if let Err(remove_err) = self.fs.remove_file(&temp_path) {
                debug!(label = %self.label, %remove_err, "no temp file left after failed save");
            }
        }
        self.clear_transaction();
        result
    }

    /// Writes the encoded document to `temp_path`.
    fn write_temp(&self, temp_path: &Path) -> StoreResult<()> {
        debug!(label = %self.label, tmp = %temp_path.display(), "saving file");

        make_parent_dirs(self.fs.as_ref(), temp_path).map_err(|e| {
            error!(label = %self.label, tmp = %temp_path.display(), "failed to make parent dirs");
            StoreError::io(IoOp::CreateDir, parent_of(temp_path), e)
        })?;

        let encoded = self.encode()?;

        let mut file = self.fs.create(temp_path).map_err(|e| {
            error!(label = %self.label, tmp = %temp_path.display(), %e, "failed to open for writing");
            StoreError::io(IoOp::Create, temp_path, e)
        })?;

        let written = write_fully(file.as_mut(), &encoded).map_err(|e| {
            error!(label = %self.label, tmp = %temp_path.display(), %e, "error writing encoded data");
            StoreError::io(IoOp::Write, temp_path, e)
        })?;
        if written != encoded.len() {
            error!(
                label = %self.label,
                tmp = %temp_path.display(),
                written,
                expected = encoded.len(),
                "short write"
            );
            return Err(StoreError::ShortWrite {
                path: temp_path.to_path_buf(),
                written,
                expected: encoded.len(),
            });
        }

        file.sync().map_err(|e| {
            error!(label = %self.label, tmp = %temp_path.display(), %e, "error syncing");
            StoreError::io(IoOp::Sync, temp_path, e)
        })?;
        file.close().map_err(|e| {
            error!(label = %self.label, tmp = %temp_path.display(), %e, "error closing");
            StoreError::io(IoOp::Close, temp_path, e)
        })?;

        debug!(label = %self.label, tmp = %temp_path.display(), "saved file");

        if self.config.verify_written_size {
            self.verify_size(temp_path, encoded.len() as u64)?;
        }
        Ok(())
    }

    fn verify_size(&self, temp_path: &Path, expected: u64) -> StoreResult<()> {
        let on_disk = self.fs.file_len(temp_path).map_err(|e| {
            error!(tmp = %temp_path.display(), %e, "error stating written file");
            StoreError::io(IoOp::Stat, temp_path, e)
        })?;
        debug!(tmp = %temp_path.display(), on_disk, expected, "verified written size");
        if on_disk != expected {
            error!(tmp = %temp_path.display(), on_disk, expected, "written size mismatch");
            return Err(StoreError::SizeMismatch {
                path: temp_path.to_path_buf(),
                on_disk,
                expected,
            });
        }
        Ok(())
    }

    fn encode(&self) -> StoreResult<Vec<u8>> {
        let document = self.document.read();
        let empty = Value::Object(Map::new());
        let value = match &*document {
            Value::Null => {
                warn!(label = %self.label, "no value for file; assuming empty value ({{}})");
                &empty
            }
            Value::Object(_) => &*document,
            other => {
                return Err(StoreError::InvalidDocument {
                    label: self.label.clone(),
                    found: json_type(other),
                })
            }
        };
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            label: self.label.clone(),
            source,
        })
    }

    /// Renames `temp_path` into place and clears the slot.
    pub(crate) fn commit_temp(&self, temp_path: &Path) -> StoreResult<()> {
        let _writer = self.writer.lock();
        debug!(label = %self.label, tmp = %temp_path.display(), "committing");
        let result = self.rename_into_place(temp_path);
        if let Err(e) = &result {
            debug!(label = %self.label, tmp = %temp_path.display(), %e, "commit failed");
        }
        self.clear_transaction();
        result
    }

    fn rename_into_place(&self, temp_path: &Path) -> StoreResult<()> {
        make_parent_dirs(self.fs.as_ref(), &self.path)
            .map_err(|e| StoreError::io(IoOp::CreateDir, parent_of(&self.path), e))?;
        self.fs
            .rename(temp_path, &self.path)
            .map_err(|e| StoreError::io(IoOp::Rename, temp_path, e))?;
        if self.config.sync_parent_dir {
            let dir = parent_of(&self.path);
            self.fs
                .sync_dir(&dir)
                .map_err(|e| StoreError::io(IoOp::SyncDir, &dir, e))?;
        }
        Ok(())
    }

    /// Removes `temp_path` and clears the slot.
    pub(crate) fn abort_temp(&self, temp_path: &Path) -> StoreResult<()> {
        let _writer = self.writer.lock();
        debug!(label = %self.label, tmp = %temp_path.display(), "aborting");
        let result = self
            .fs
            .remove_file(temp_path)
            .map_err(|e| StoreError::io(IoOp::Remove, temp_path, e));
        self.clear_transaction();
        debug!(label = %self.label, ok = result.is_ok(), "abort finished");
        result
    }

    fn clear_transaction(&self) {
        *self.tx.lock() = None;
    }
}

/// Decodes a document; empty or all-whitespace input is an empty object.
fn decode(data: &[u8]) -> Result<Map<String, Value>, serde_json::Error> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    serde_json::from_slice(data)
}

/// Writes `buf` until it is exhausted or the file stops accepting bytes.
///
/// Returns the number of bytes written, which is short of `buf.len()` only
/// when the file reported a zero-length write.
fn write_fully(file: &mut dyn WritableFile, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_storage::{Fault, InMemoryFileSystem};
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    const PATH: &str = "/cfg/app.json";

    fn config() -> StoreConfig {
        StoreConfig::new().permission_retry_delay(Duration::ZERO)
    }

    fn memory_store_with(config: StoreConfig) -> (InMemoryFileSystem, JsonFile) {
        let fs = InMemoryFileSystem::new();
        let store = JsonFile::with_fs(PATH, "config", Arc::new(fs.clone()), config);
        (fs, store)
    }

    fn memory_store() -> (InMemoryFileSystem, JsonFile) {
        memory_store_with(config())
    }

    fn temp_files(fs: &InMemoryFileSystem) -> Vec<PathBuf> {
        fs.paths()
            .into_iter()
            .filter(|p| p != Path::new(PATH))
            .collect()
    }

    fn on_disk(fs: &InMemoryFileSystem) -> Value {
        serde_json::from_slice(&fs.contents(PATH).unwrap()).unwrap()
    }

    // ── load ────────────────────────────────────────────────────────────────

    #[test]
    fn load_missing_is_not_an_error() {
        let (_fs, store) = memory_store();

        assert_eq!(store.load(true).unwrap(), LoadStatus::Missing);
        assert!(!store.exists());
        assert_eq!(store.document(), json!({}));
    }

    #[test]
    fn load_empty_file_is_empty_object() {
        let (fs, store) = memory_store();
        fs.insert(PATH, Vec::new());

        assert_eq!(store.load(false).unwrap(), LoadStatus::Loaded);
        assert!(store.exists());
        assert_eq!(store.document(), json!({}));
    }

    #[test]
    fn load_whitespace_file_is_empty_object() {
        let (fs, store) = memory_store();
        fs.insert(PATH, b" \n\t \r\n".to_vec());

        assert_eq!(store.load(false).unwrap(), LoadStatus::Loaded);
        assert_eq!(store.document(), json!({}));
    }

    #[test]
    fn load_replaces_document() {
        let (fs, store) = memory_store();
        store.set("stale", 1);
        fs.insert(PATH, br#"{"fresh": {"nested": [1, 2, 3]}}"#.to_vec());

        store.load(false).unwrap();

        assert_eq!(store.document(), json!({"fresh": {"nested": [1, 2, 3]}}));
    }

    #[test]
    fn load_corrupt_file_fails() {
        let (fs, store) = memory_store();
        fs.insert(PATH, b"{\"a\": ".to_vec());

        let err = store.load(false).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
        assert!(store.exists());
    }

    #[test]
    fn load_non_object_root_fails() {
        let (fs, store) = memory_store();
        fs.insert(PATH, b"[1, 2]".to_vec());

        assert!(matches!(
            store.load(false),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn load_retries_permission_denied() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"a": 1}"#.to_vec());
        fs.inject(Fault::DenyReads(2));

        assert_eq!(store.load(false).unwrap(), LoadStatus::Loaded);
        assert_eq!(fs.read_attempts(), 3);
        assert_eq!(store.get("a"), Some(json!(1)));
    }

    #[test]
    fn load_permission_exhaustion_is_soft_failure() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"a": 1}"#.to_vec());
        fs.inject(Fault::DenyReads(100));

        let status = store.load(false).unwrap();

        assert_eq!(status, LoadStatus::PermissionDenied { attempts: 5 });
        assert_eq!(fs.read_attempts(), 5);
        assert!(!store.exists());
        assert_eq!(store.document(), json!({}));
    }

    #[test]
    fn load_zero_retries_still_tries_once() {
        let (fs, store) = memory_store_with(config().permission_retries(0));
        fs.inject(Fault::DenyReads(100));

        let status = store.load(false).unwrap();
        assert_eq!(status, LoadStatus::PermissionDenied { attempts: 1 });
    }

    // ── save ────────────────────────────────────────────────────────────────

    #[test]
    fn save_round_trips_through_fresh_store() {
        let (fs, store) = memory_store();
        store.set("name", "max");
        store.set("ports", json!([24800, 24801]));
        store.set("nested", json!({"a": {"b": null, "c": 1.5}}));

        store.save().unwrap();

        let reopened = JsonFile::with_fs(PATH, "config", Arc::new(fs.clone()), config());
        assert_eq!(reopened.load(false).unwrap(), LoadStatus::Loaded);
        assert_eq!(reopened.document(), store.document());
        assert!(temp_files(&fs).is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn save_output_is_pretty_printed() {
        let (fs, store) = memory_store();
        store.set("a", 1);
        store.save().unwrap();

        let text = String::from_utf8(fs.contents(PATH).unwrap()).unwrap();
        assert!(text.contains('\n'));
        assert!(text.contains("  \"a\": 1"));
    }

    #[test]
    fn save_creates_parent_directories() {
        let fs = InMemoryFileSystem::new();
        let store = JsonFile::with_fs(
            "/deep/nested/dir/app.json",
            "config",
            Arc::new(fs.clone()),
            config(),
        );

        store.save().unwrap();

        assert!(fs.is_dir("/deep/nested/dir"));
        assert_eq!(fs.contents("/deep/nested/dir/app.json").unwrap(), b"{}");
    }

    #[test]
    fn save_absent_document_writes_empty_object() {
        let (fs, store) = memory_store();
        store.set_document(Value::Null);

        store.save().unwrap();

        assert_eq!(on_disk(&fs), json!({}));
    }

    #[test]
    fn save_non_object_document_fails_without_writing() {
        let (fs, store) = memory_store();
        store.set_document(json!([1, 2, 3]));

        let err = store.save().unwrap_err();

        assert!(matches!(err, StoreError::InvalidDocument { found: "array", .. }));
        assert!(fs.paths().is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn short_write_aborts_implicit_transaction() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"old": true}"#.to_vec());
        store.set("payload", "x".repeat(64));
        fs.inject(Fault::WriteLimit(3));

        let err = store.save().unwrap_err();

        assert!(err.is_short_write());
        assert!(matches!(err, StoreError::ShortWrite { written: 3, .. }));
        assert!(temp_files(&fs).is_empty());
        assert_eq!(on_disk(&fs), json!({"old": true}));
        assert!(!store.in_transaction());
    }

    #[test]
    fn interrupted_write_leaves_destination_untouched() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"old": true}"#.to_vec());
        store.set("payload", "y".repeat(256));
        fs.inject(Fault::InterruptWriteAfter(10));

        let err = store.save().unwrap_err();

        assert_eq!(err.io_op(), Some(IoOp::Write));
        assert_eq!(on_disk(&fs), json!({"old": true}));
        assert!(temp_files(&fs).is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn sync_failure_is_hard_failure() {
        let (fs, store) = memory_store();
        fs.inject(Fault::FailSync);

        let err = store.save().unwrap_err();

        assert_eq!(err.io_op(), Some(IoOp::Sync));
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn close_failure_is_hard_failure() {
        let (fs, store) = memory_store();
        fs.inject(Fault::FailClose);

        let err = store.save().unwrap_err();

        assert_eq!(err.io_op(), Some(IoOp::Close));
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn mkdir_failure_is_hard_failure() {
        let (fs, store) = memory_store();
        fs.inject(Fault::FailCreateDir);

        let err = store.save().unwrap_err();

        assert_eq!(err.io_op(), Some(IoOp::CreateDir));
        assert!(!store.in_transaction());
    }

    #[test]
    fn size_verification_catches_silent_truncation() {
        let (fs, store) = memory_store_with(config().verify_written_size(true));
        store.set("a", 1);
        fs.inject(Fault::ReportedLen(1));

        let err = store.save().unwrap_err();

        assert!(matches!(err, StoreError::SizeMismatch { on_disk: 1, .. }));
        assert!(fs.paths().is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn size_verification_off_skips_stat() {
        let (fs, store) = memory_store_with(config().verify_written_size(false));
        fs.inject(Fault::ReportedLen(1));

        store.save().unwrap();
        assert!(fs.exists(PATH));
    }

    #[test]
    fn size_verification_passes_on_honest_filesystem() {
        let (fs, store) = memory_store_with(config().verify_written_size(true));
        store.set("a", json!({"b": [true, false]}));

        store.save().unwrap();
        assert_eq!(on_disk(&fs), json!({"a": {"b": [true, false]}}));
    }

    #[test]
    fn failed_implicit_commit_removes_temp_file() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"old": true}"#.to_vec());
        fs.inject(Fault::FailRename);

        let err = store.save().unwrap_err();

        assert_eq!(err.io_op(), Some(IoOp::Rename));
        assert!(temp_files(&fs).is_empty());
        assert_eq!(on_disk(&fs), json!({"old": true}));
        assert!(!store.in_transaction());
    }

    /// Blocks the first `create` until the test releases it.
    struct GatedFileSystem {
        inner: InMemoryFileSystem,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl FileSystem for GatedFileSystem {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.inner.read(path)
        }

        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            self.inner.create_dir_all(path)
        }

        fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
            let gate = self.gate.lock().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.create(path)
        }

        fn file_len(&self, path: &Path) -> io::Result<u64> {
            self.inner.file_len(path)
        }

        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.inner.rename(from, to)
        }

        fn remove_file(&self, path: &Path) -> io::Result<()> {
            self.inner.remove_file(path)
        }

        fn sync_dir(&self, dir: &Path) -> io::Result<()> {
            self.inner.sync_dir(dir)
        }
    }

    #[test]
    fn concurrent_save_waits_for_implicit_transaction() {
        let fs = InMemoryFileSystem::new();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gated = GatedFileSystem {
            inner: fs.clone(),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        };
        let store = JsonFile::with_fs(PATH, "config", Arc::new(gated), config());

        thread::scope(|s| {
            store.set("a", 1);
            let first = s.spawn(|| store.save());
            entered_rx.recv().unwrap();

            // The first save is mid-write inside its implicit transaction.
            assert!(store.in_transaction());
            assert!(matches!(
                store.begin_transaction(),
                Err(StoreError::TransactionInProgress { .. })
            ));

            store.set("b", 2);
            let second = s.spawn(|| store.save());
            thread::sleep(Duration::from_millis(50));
            release_tx.send(()).unwrap();

            first.join().unwrap().unwrap();
            second.join().unwrap().unwrap();
        });

        assert_eq!(on_disk(&fs), json!({"a": 1, "b": 2}));
        assert!(temp_files(&fs).is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn save_joins_explicit_transaction_from_another_thread() {
        let (fs, store) = memory_store();

        let tx = store.begin_transaction().unwrap();
        store.set("v", 1);
        thread::scope(|s| {
            s.spawn(|| store.save()).join().unwrap().unwrap();
        });

        assert!(fs.exists(tx.temp_path()));
        assert!(!fs.exists(PATH));
        tx.commit().unwrap();
        assert_eq!(on_disk(&fs), json!({"v": 1}));
    }

    // ── explicit transactions ───────────────────────────────────────────────

    #[test]
    fn explicit_transaction_defers_visibility_until_commit() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"v": 1}"#.to_vec());
        store.load(false).unwrap();

        let tx = store.begin_transaction().unwrap();
        let temp = tx.temp_path().to_path_buf();
        store.set("v", 2);
        store.save().unwrap();

        assert_eq!(on_disk(&fs), json!({"v": 1}));
        assert!(fs.exists(&temp));
        assert!(store.in_transaction());

        tx.commit().unwrap();

        assert_eq!(on_disk(&fs), json!({"v": 2}));
        assert!(!fs.exists(&temp));
        assert!(!store.in_transaction());
    }

    #[test]
    fn repeated_saves_in_one_transaction_keep_last() {
        let (fs, store) = memory_store();

        let tx = store.begin_transaction().unwrap();
        store.set("step", 1);
        store.save().unwrap();
        store.set("step", 2);
        store.save().unwrap();
        tx.commit().unwrap();

        assert_eq!(on_disk(&fs), json!({"step": 2}));
        assert!(temp_files(&fs).is_empty());
    }

    #[test]
    fn second_begin_fails_and_keeps_first() {
        let (fs, store) = memory_store();

        let tx = store.begin_transaction().unwrap();
        let err = store.begin_transaction().unwrap_err();

        assert!(matches!(err, StoreError::TransactionInProgress { .. }));
        assert!(store.in_transaction());

        store.save().unwrap();
        assert!(fs.exists(tx.temp_path()));
        tx.commit().unwrap();
        assert!(fs.exists(PATH));
    }

    #[test]
    fn abort_removes_temp_and_frees_slot() {
        let (fs, store) = memory_store();
        fs.insert(PATH, br#"{"v": 1}"#.to_vec());

        let tx = store.begin_transaction().unwrap();
        let temp = tx.temp_path().to_path_buf();
        store.set("v", 2);
        store.save().unwrap();
        assert!(fs.exists(&temp));

        tx.abort().unwrap();

        assert!(!fs.exists(&temp));
        assert_eq!(on_disk(&fs), json!({"v": 1}));
        assert!(!store.in_transaction());
        let next = store.begin_transaction().unwrap();
        next.abort().unwrap_err();
    }

    #[test]
    fn abort_without_write_reports_not_found_but_clears_slot() {
        let (_fs, store) = memory_store();

        let tx = store.begin_transaction().unwrap();
        let err = tx.abort().unwrap_err();

        assert!(err.is_not_found());
        assert!(!store.in_transaction());
    }

    #[test]
    fn failed_commit_keeps_temp_and_clears_slot() {
        let (fs, store) = memory_store();

        let tx = store.begin_transaction().unwrap();
        let temp = tx.temp_path().to_path_buf();
        store.save().unwrap();
        fs.inject(Fault::FailRename);

        let err = tx.commit().unwrap_err();

        assert_eq!(err.io_op(), Some(IoOp::Rename));
        assert!(fs.exists(&temp));
        assert!(!fs.exists(PATH));
        assert!(!store.in_transaction());

        fs.clear_faults();
        store.begin_transaction().unwrap().commit().unwrap_err();
    }

    #[test]
    fn dropped_transaction_is_aborted() {
        let (fs, store) = memory_store();

        let temp = {
            let tx = store.begin_transaction().unwrap();
            store.save().unwrap();
            tx.temp_path().to_path_buf()
        };

        assert!(!fs.exists(&temp));
        assert!(!store.in_transaction());
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn transactions_use_distinct_temp_paths() {
        let (_fs, store) = memory_store();

        let first = store.begin_transaction().unwrap();
        let first_path = first.temp_path().to_path_buf();
        let _ = first.abort();
        let second = store.begin_transaction().unwrap();

        assert_ne!(first_path, second.temp_path());
        let _ = second.abort();
    }

    // ── nuke ────────────────────────────────────────────────────────────────

    #[test]
    fn nuke_missing_file_reports_not_found() {
        let (fs, store) = memory_store();

        let err = store.nuke().unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.io_op(), Some(IoOp::Remove));
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn nuke_removes_file() {
        let (fs, store) = memory_store();
        fs.insert(PATH, b"{}".to_vec());
        store.load(false).unwrap();
        assert!(store.exists());

        store.nuke().unwrap();

        assert!(!fs.exists(PATH));
        assert!(!store.exists());
        assert_eq!(store.load(false).unwrap(), LoadStatus::Missing);
    }

    // ── accessors ───────────────────────────────────────────────────────────

    #[test]
    fn set_get_remove() {
        let (_fs, store) = memory_store();

        assert_eq!(store.set("k", "v1"), None);
        assert_eq!(store.set("k", "v2"), Some(json!("v1")));
        assert_eq!(store.get("k"), Some(json!("v2")));
        assert_eq!(store.remove("k"), Some(json!("v2")));
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn set_on_absent_document_starts_fresh_object() {
        let (_fs, store) = memory_store();
        store.set_document(Value::Null);

        store.set("k", true);
        assert_eq!(store.document(), json!({"k": true}));
    }

    #[test]
    fn update_and_read_closures() {
        let (_fs, store) = memory_store();

        store.update(|doc| doc["list"] = json!([1]));
        let len = store.read(|doc| doc["list"].as_array().map(Vec::len));

        assert_eq!(len, Some(1));
    }
}
