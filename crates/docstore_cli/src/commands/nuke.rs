//! Nuke command implementation.

use docstore_core::JsonFile;
use std::path::Path;

/// Deletes the document file.
pub fn run(path: &Path, label: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFile::new(path, label);
    match store.nuke() {
        Ok(()) => println!("✓ Removed {}", path.display()),
        Err(e) if e.is_not_found() => println!("Nothing to remove at {}", path.display()),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
