//! Key-level edit commands.
//!
//! Each edit loads the document, changes one top-level key, and saves it
//! through an implicit transaction.

use docstore_core::{JsonFile, LoadStatus};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Parses `raw` as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Loads `store`. An unreadable file is fatal when the caller will save,
/// since saving would replace content that was never read.
fn load(store: &JsonFile, writing: bool) -> Result<(), Box<dyn std::error::Error>> {
    match store.load(false)? {
        LoadStatus::PermissionDenied { attempts } if writing => Err(format!(
            "could not read {} after {attempts} attempts; refusing to overwrite it",
            store.path().display()
        )
        .into()),
        LoadStatus::PermissionDenied { attempts } => {
            warn!(attempts, "permission denied reading {}", store.path().display());
            Ok(())
        }
        LoadStatus::Loaded | LoadStatus::Missing => Ok(()),
    }
}

/// Prints the value stored under `key`.
pub fn get(path: &Path, label: &str, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let value = get_in(&JsonFile::new(path, label), key)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn get_in(store: &JsonFile, key: &str) -> Result<Value, Box<dyn std::error::Error>> {
    load(store, false)?;
    let value = store
        .get(key)
        .ok_or_else(|| format!("key {key:?} not found in {}", store.path().display()))?;
    Ok(value)
}

/// Stores `raw` under `key` and saves.
pub fn set(
    path: &Path,
    label: &str,
    key: &str,
    raw: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    set_in(&JsonFile::new(path, label), key, raw)
}

fn set_in(store: &JsonFile, key: &str, raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    load(store, true)?;
    let previous = store.set(key, parse_value(raw));
    store.save()?;
    info!(key, replaced = previous.is_some(), "saved {}", store.path().display());
    Ok(())
}

/// Removes `key` and saves. Removing an absent key is an error.
pub fn remove(path: &Path, label: &str, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    remove_in(&JsonFile::new(path, label), key)
}

fn remove_in(store: &JsonFile, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    load(store, true)?;
    store
        .remove(key)
        .ok_or_else(|| format!("key {key:?} not found in {}", store.path().display()))?;
    store.save()?;
    info!(key, "removed from {}", store.path().display());
    Ok(())
}
