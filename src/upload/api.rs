//! Authenticated Dropbox capability used by the upload engine.
//!
//! `DropboxApi` is implemented by [`DropboxClient`](crate::upload::client::DropboxClient)
//! for real transfers and by recording mocks in tests.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::upload::error::UploadError;

/// Boxed future returned by [`DropboxApi`] calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Metadata of a committed file, as returned by upload and finish calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub path_display: String,
    pub rev: String,
}

/// Position within an upload session: bytes the server has already committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCursor {
    pub session_id: String,
    pub offset: u64,
}

/// How a commit treats an existing file at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    Overwrite,
}

/// Destination of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub path: String,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
}

impl CommitInfo {
    /// Commit that replaces whatever exists at `path`.
    pub fn overwrite(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: WriteMode::Overwrite,
            autorename: false,
            mute: false,
        }
    }
}

/// Operations the upload engine needs from an authenticated client.
///
/// Implementations perform no retries; every failure is returned as-is.
pub trait DropboxApi: Send + Sync {
    /// Uploads `body` as a whole file at `path`, overwriting.
    fn upload(&self, path: &str, body: Vec<u8>) -> ApiFuture<'_, FileMetadata>;

    /// Opens an upload session with the first chunk, returning its id.
    fn session_start(&self, body: Vec<u8>) -> ApiFuture<'_, String>;

    /// Appends a chunk at `cursor`.
    fn session_append(&self, cursor: &UploadCursor, body: Vec<u8>) -> ApiFuture<'_, ()>;

    /// Appends the last chunk and commits the session to `commit.path`.
    fn session_finish(
        &self,
        cursor: &UploadCursor,
        commit: &CommitInfo,
        body: Vec<u8>,
    ) -> ApiFuture<'_, FileMetadata>;
}
