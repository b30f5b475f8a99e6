//! # docstore core
//!
//! Crash-safe persistence for dictionary-shaped JSON documents.
//!
//! This crate provides:
//! - [`JsonFile`] - an in-memory JSON object mirrored to a file
//! - [`Transaction`] - one atomic write: temp file, sync, rename
//! - [`StoreConfig`] - retry, verification and durability knobs
//!
//! ## Write protocol
//!
//! ```text
//! save()   -> <path>.<random>   create, write, verify length, sync, close
//! commit() -> rename(<path>.<random>, <path>), fsync(dir)
//! abort()  -> remove(<path>.<random>)
//! ```
//!
//! A reader of `<path>` sees either the previous complete document or the
//! new complete document, never a partial one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod store;
mod transaction;

pub use config::{StoreConfig, DEFAULT_PERMISSION_RETRIES, DEFAULT_PERMISSION_RETRY_DELAY};
pub use error::{IoOp, StoreError, StoreResult};
pub use store::{JsonFile, LoadStatus};
pub use transaction::{Transaction, TEMP_SUFFIX_LEN};

pub use docstore_storage::{Fault, FileSystem, InMemoryFileSystem, OsFileSystem};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
