use std::time::Duration;

/// Files at or above this size cannot use the single-shot endpoint.
pub const CHUNKED_THRESHOLD: u64 = 150 * 1024 * 1024;

pub const MIN_CHUNK_SIZE_KB: usize = 128;
pub const MIN_CHUNK_SIZE: usize = MIN_CHUNK_SIZE_KB * 1024;
pub const DEFAULT_CHUNK_SIZE_KB: usize = 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 100;

/// Validated upload settings, independent of how they were collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Destination folder, forward-slash separated. Empty means root.
    pub dropbox_path: String,
    pub chunked: bool,
    pub chunk_size_kb: usize,
    pub timeout_secs: u64,
    pub quiet: bool,
    pub no_progress: bool,
    pub report_bytes: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            dropbox_path: String::new(),
            chunked: false,
            chunk_size_kb: DEFAULT_CHUNK_SIZE_KB,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            quiet: false,
            no_progress: false,
            report_bytes: false,
        }
    }
}

impl UploadOptions {
    /// Chunk size in bytes, never below [`MIN_CHUNK_SIZE`].
    pub fn chunk_size(&self) -> usize {
        (self.chunk_size_kb * 1024).max(MIN_CHUNK_SIZE)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Converts Windows-style separators in a destination folder.
pub fn normalize_folder(folder: &str) -> String {
    folder.replace('\\', "/")
}

/// Joins a destination folder and a file name.
///
/// The root folder `/` is special-cased so it never doubles the separator.
pub fn combine_path(folder: &str, filename: &str) -> String {
    if folder == "/" {
        format!("/{filename}")
    } else {
        format!("{folder}/{filename}")
    }
}
