//! Dropbox uploader: single-shot and resumable chunked uploads.

pub mod upload;
