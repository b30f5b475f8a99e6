//! Show command implementation.

use docstore_core::{JsonFile, LoadStatus};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Document summary.
#[derive(Debug, Serialize)]
pub struct ShowResult {
    /// Document path.
    pub path: String,
    /// Whether the file was found.
    pub exists: bool,
    /// Whether the file could not be opened for lack of permission.
    pub permission_denied: bool,
    /// Number of top-level keys.
    pub key_count: usize,
    /// The document itself.
    pub document: Value,
}

/// Loads the document at `path` and summarizes it.
pub fn inspect(path: &Path, label: &str) -> Result<ShowResult, Box<dyn std::error::Error>> {
    let store = JsonFile::new(path, label);
    let status = store.load(true)?;
    let document = store.document();

    Ok(ShowResult {
        path: path.display().to_string(),
        exists: store.exists(),
        permission_denied: matches!(status, LoadStatus::PermissionDenied { .. }),
        key_count: document.as_object().map_or(0, |map| map.len()),
        document,
    })
}

/// Runs the show command.
pub fn run(path: &Path, label: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, label)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result)?,
    }

    Ok(())
}

fn print_text_output(result: &ShowResult) -> Result<(), serde_json::Error> {
    println!("Path:   {}", result.path);
    println!("Exists: {}", result.exists);
    if result.permission_denied {
        println!("Warning: permission denied; showing an empty document");
    }
    println!("Keys:   {}", result.key_count);
    println!();
    println!("{}", serde_json::to_string_pretty(&result.document)?);
    Ok(())
}
