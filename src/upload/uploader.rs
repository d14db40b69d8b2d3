//! Drives single-shot and chunked uploads.

use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::upload::api::{DropboxApi, FileMetadata};
use crate::upload::config::{
    CHUNKED_THRESHOLD, MIN_CHUNK_SIZE, UploadOptions, combine_path, normalize_folder,
};
use crate::upload::console::Console;
use crate::upload::error::UploadError;
use crate::upload::policy::decide;
use crate::upload::progress::{Progress, ProgressSink};
use crate::upload::session::UploadSession;
use crate::upload::source::{ChunkPlan, ChunkSource};

/// Uploads local files through a [`DropboxApi`], one at a time.
///
/// Cancellation is cooperative: the token is checked before each file and
/// before each chunk, never while a request is in flight.
pub struct Uploader<'a> {
    api: &'a dyn DropboxApi,
    cancel: CancellationToken,
    console: Console,
    show_cancel_hint: bool,
}

impl<'a> Uploader<'a> {
    pub fn new(api: &'a dyn DropboxApi, cancel: CancellationToken, console: Console) -> Self {
        Self {
            api,
            cancel,
            console,
            show_cancel_hint: true,
        }
    }

    /// Stops the per-file "Ctrl-C to cancel" hint, e.g. after a folder banner showed it.
    pub fn hide_cancel_hint(&mut self) {
        self.show_cancel_hint = false;
    }

    /// Uploads `files` in order, stopping at the first failure.
    pub async fn upload_files(
        &mut self,
        files: &[PathBuf],
        options: &UploadOptions,
    ) -> Result<Vec<FileMetadata>, UploadError> {
        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            uploaded.push(self.upload_file(file, options).await?);
        }
        Ok(uploaded)
    }

    /// Uploads one file into `options.dropbox_path`, choosing the mode by size.
    pub async fn upload_file(
        &mut self,
        path: &Path,
        options: &UploadOptions,
    ) -> Result<FileMetadata, UploadError> {
        self.check_cancelled()?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::BadInput(format!("{} has no file name", path.display())))?;
        let folder = normalize_folder(&options.dropbox_path);

        self.console.line(uploading_line(&filename, &folder));
        if self.show_cancel_hint {
            self.console.line("Ctrl-C to cancel");
            self.show_cancel_hint = false;
        }

        let mut source = ChunkSource::open(path).await?;
        let mode = decide(
            source.length(),
            options.chunked,
            CHUNKED_THRESHOLD,
            options.chunk_size(),
        );
        for adjustment in mode.adjustments() {
            self.console.line(adjustment.to_string());
        }

        let destination = combine_path(&folder, &filename);
        let metadata = if mode.chunked {
            let mut progress = ProgressSink::for_options(options, source.length());
            self.upload_chunked(&mut source, &destination, mode.chunk_size, &mut progress)
                .await?
        } else {
            self.upload_single(&mut source, &destination).await?
        };

        info!(
            path = %metadata.path_display,
            rev = %metadata.rev,
            bytes = source.length(),
            "upload complete"
        );
        self.console.line("Whoosh...");
        self.console.line(format!(
            "Uploaded {} to {}; Revision {}",
            metadata.name, metadata.path_display, metadata.rev
        ));
        Ok(metadata)
    }

    /// Sends the whole stream in one request.
    pub async fn upload_single<R: AsyncRead + Unpin>(
        &self,
        source: &mut ChunkSource<R>,
        destination: &str,
    ) -> Result<FileMetadata, UploadError> {
        self.check_cancelled()?;
        let body = source.read_to_end().await?;
        self.api.upload(destination, body).await
    }

    /// Streams `source` through an upload session in `chunk_size` pieces.
    ///
    /// The first chunk opens the session and the last one commits it, so the
    /// stream must be longer than one chunk. `chunk_size` must be at least
    /// [`MIN_CHUNK_SIZE`]. `progress` receives the committed byte count after
    /// every later chunk.
    pub async fn upload_chunked<R: AsyncRead + Unpin>(
        &self,
        source: &mut ChunkSource<R>,
        destination: &str,
        chunk_size: usize,
        progress: &mut dyn Progress,
    ) -> Result<FileMetadata, UploadError> {
        let plan = ChunkPlan::new(source.length(), chunk_size)
            .filter(|_| chunk_size >= MIN_CHUNK_SIZE)
            .ok_or_else(|| {
                UploadError::BadInput(format!(
                    "chunk size {chunk_size} is below the {MIN_CHUNK_SIZE}-byte minimum"
                ))
            })?;
        if plan.chunk_count < 2 {
            return Err(UploadError::Session(format!(
                "{} bytes fit in a single {chunk_size}-byte chunk",
                plan.total_length
            )));
        }

        let mut session = UploadSession::new(self.api, destination);
        let mut buffer = vec![0u8; chunk_size];
        let mut metadata = None;

        for index in 0..plan.chunk_count {
            if self.cancel.is_cancelled() {
                session.cancel();
                return Err(UploadError::Cancelled);
            }

            let n = match source.read_next(&mut buffer).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        destination = session.destination(),
                        session_id = ?session.session_id(),
                        index,
                        read = source.position(),
                        error = %e,
                        "failed to read chunk"
                    );
                    return Err(e.into());
                }
            };
            debug_assert_eq!(n, plan.chunk_len(index));
            let chunk = buffer[..n].to_vec();

            if index == 0 {
                session.start(chunk).await?;
                continue;
            }
            if plan.is_last(index) {
                metadata = Some(session.finish(chunk).await?);
            } else {
                session.append(chunk).await?;
            }

            if !self.cancel.is_cancelled() {
                progress.report(session.bytes_committed());
            }
        }

        metadata.ok_or_else(|| UploadError::Session("session was never finished".into()))
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-file status line; the folder is printed exactly as normalized.
fn uploading_line(filename: &str, folder: &str) -> String {
    format!("Uploading {filename} to {folder}")
}

/// Destination folder as shown to the user; the root reads as `Dropbox`.
pub fn display_folder(folder: &str) -> &str {
    if folder.is_empty() { "Dropbox" } else { folder }
}
