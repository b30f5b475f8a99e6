//! # docstore storage
//!
//! Filesystem seam for docstore.
//!
//! The document store never touches `std::fs` directly. Every blocking call it
//! makes (read, create, write, sync, close, stat, rename, remove, mkdir) goes
//! through the [`FileSystem`] trait so that the atomic write protocol can be
//! exercised against injected faults.
//!
//! ## Available Backends
//!
//! - [`OsFileSystem`] - Real files, created with [`PERM_FILE`] / [`PERM_DIR`]
//! - [`InMemoryFileSystem`] - Deterministic, fault-injectable, for tests
//!
//! ## Example
//!
//! ```rust
//! use docstore_storage::{FileSystem, InMemoryFileSystem};
//! use std::path::Path;
//!
//! let fs = InMemoryFileSystem::new();
//! fs.create_dir_all(Path::new("/cfg")).unwrap();
//! let mut file = fs.create(Path::new("/cfg/app.json")).unwrap();
//! assert_eq!(file.write(b"{}").unwrap(), 2);
//! file.close().unwrap();
//! assert_eq!(fs.read(Path::new("/cfg/app.json")).unwrap(), b"{}");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod file;
mod memory;

pub use backend::{make_parent_dirs, FileSystem, WritableFile};
pub use file::{OsFileSystem, PERM_DIR, PERM_FILE};
pub use memory::{Fault, InMemoryFileSystem};
