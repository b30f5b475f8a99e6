//! Store configuration.

use std::time::Duration;

/// Attempts made to open a file that reports permission denied.
pub const DEFAULT_PERMISSION_RETRIES: u32 = 5;

/// Pause between permission-denied attempts.
pub const DEFAULT_PERMISSION_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Configuration for a [`crate::JsonFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// How many times `load` tries to open a file that reports permission
    /// denied before giving up. Values below 1 are treated as 1.
    pub permission_retries: u32,

    /// Delay between those attempts.
    pub permission_retry_delay: Duration,

    /// Whether to re-stat the temporary file after writing and fail if its
    /// size differs from the encoded length. Enabled by default on Android,
    /// whose filesystems have been seen to truncate writes silently.
    pub verify_written_size: bool,

    /// Whether to fsync the destination directory after the commit rename.
    pub sync_parent_dir: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            permission_retries: DEFAULT_PERMISSION_RETRIES,
            permission_retry_delay: DEFAULT_PERMISSION_RETRY_DELAY,
            verify_written_size: cfg!(target_os = "android"),
            sync_parent_dir: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of permission-denied attempts.
    #[must_use]
    pub const fn permission_retries(mut self, attempts: u32) -> Self {
        self.permission_retries = attempts;
        self
    }

    /// Sets the delay between permission-denied attempts.
    #[must_use]
    pub const fn permission_retry_delay(mut self, delay: Duration) -> Self {
        self.permission_retry_delay = delay;
        self
    }

    /// Enables or disables post-write size verification.
    #[must_use]
    pub const fn verify_written_size(mut self, value: bool) -> Self {
        self.verify_written_size = value;
        self
    }

    /// Enables or disables the directory fsync after commit.
    #[must_use]
    pub const fn sync_parent_dir(mut self, value: bool) -> Self {
        self.sync_parent_dir = value;
        self
    }
}
