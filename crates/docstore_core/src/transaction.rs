//! Atomic write transactions.
//!
//! A [`Transaction`] owns one temporary file next to the store's backing
//! file. [`crate::JsonFile::save`] writes the document there, and
//! [`Transaction::commit`] renames it over the backing file in a single
//! filesystem operation. [`Transaction::abort`] deletes it instead.
//!
//! Both terminal calls consume the handle, and both clear the store's
//! active-transaction slot whether or not they succeed. A handle dropped
//! without either call is aborted.

use crate::error::StoreResult;
use crate::store::JsonFile;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Length of the random suffix appended to temporary file names.
pub const TEMP_SUFFIX_LEN: usize = 15;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Returns a random suffix for a temporary file name.
///
/// Used for collision avoidance only; it carries no security meaning.
pub(crate) fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMP_SUFFIX_LEN)
        .map(|_| char::from(SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())]))
        .collect()
}

/// Returns `<path>.<random suffix>`.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(random_suffix());
    PathBuf::from(name)
}

/// One in-flight atomic write on a [`JsonFile`].
///
/// # Example
///
/// ```rust,no_run
/// use docstore_core::JsonFile;
/// use serde_json::json;
///
/// let store = JsonFile::new("config.json", "config");
/// let tx = store.begin_transaction()?;
/// store.set("theme", json!("dark"));
/// store.save()?;
/// tx.commit()?;
/// # Ok::<(), docstore_core::StoreError>(())
/// ```
#[must_use = "a transaction that is dropped is aborted"]
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a JsonFile,
    temp_path: PathBuf,
    resolved: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a JsonFile, temp_path: PathBuf) -> Self {
        Self {
            store,
            temp_path,
            resolved: false,
        }
    }

    /// Returns the temporary file this transaction writes to.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Renames the temporary file over the backing file.
    ///
    /// On failure the temporary file is left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination directory cannot be created or the
    /// rename (or the directory sync that follows it) fails.
    pub fn commit(mut self) -> StoreResult<()> {
        self.resolved = true;
        self.store.commit_temp(&self.temp_path)
    }

    /// Deletes the temporary file.
    ///
    /// # Errors
    ///
    /// Returns the removal error, including `NotFound` when nothing was
    /// written under this transaction.
    pub fn abort(mut self) -> StoreResult<()> {
        self.resolved = true;
        self.store.abort_temp(&self.temp_path)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        warn!(
            label = %self.store.label(),
            tmp = %self.temp_path.display(),
            "transaction dropped without commit or abort; aborting"
        );
        // The removal error has nowhere to go from drop; the slot is cleared
        // regardless.
        let _ = self.store.abort_temp(&self.temp_path);
    }
}
