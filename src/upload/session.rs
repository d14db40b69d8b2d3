//! Resumable upload session.
//!
//! A session is opened by the first chunk, extended by appends at the
//! committed cursor, and committed to its destination by the last chunk.
//! Sessions that fail or are cancelled are simply dropped; the server
//! expires them.

use tracing::{debug, warn};

use crate::upload::api::{CommitInfo, DropboxApi, FileMetadata, UploadCursor};
use crate::upload::error::UploadError;

/// Lifecycle of an [`UploadSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Started,
    Appending,
    Finished,
    Cancelled,
    Failed,
}

/// Client side of one upload session: its id and committed byte cursor.
pub struct UploadSession<'a> {
    api: &'a dyn DropboxApi,
    destination: String,
    session_id: Option<String>,
    bytes_committed: u64,
    state: SessionState,
}

impl<'a> UploadSession<'a> {
    pub fn new(api: &'a dyn DropboxApi, destination: impl Into<String>) -> Self {
        Self {
            api,
            destination: destination.into(),
            session_id: None,
            bytes_committed: 0,
            state: SessionState::Unstarted,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Bytes the server has accepted so far.
    pub fn bytes_committed(&self) -> u64 {
        self.bytes_committed
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Opens the session with the first chunk.
    pub async fn start(&mut self, chunk: Vec<u8>) -> Result<&str, UploadError> {
        self.expect_state(&[SessionState::Unstarted], "start")?;

        let len = chunk.len() as u64;
        let result = self.api.session_start(chunk).await;
        let session_id = self.track(result)?;
        debug!(session_id = %session_id, bytes = len, "upload session started");

        self.bytes_committed = len;
        self.state = SessionState::Started;
        Ok(self.session_id.insert(session_id).as_str())
    }

    /// Appends a middle chunk at the current cursor.
    pub async fn append(&mut self, chunk: Vec<u8>) -> Result<(), UploadError> {
        self.expect_state(&[SessionState::Started, SessionState::Appending], "append")?;

        let cursor = self.cursor()?;
        let len = chunk.len() as u64;
        debug!(
            session_id = %cursor.session_id,
            offset = cursor.offset,
            bytes = len,
            "appending chunk"
        );
        let result = self.api.session_append(&cursor, chunk).await;
        self.track(result)?;

        self.bytes_committed += len;
        self.state = SessionState::Appending;
        Ok(())
    }

    /// Sends the last chunk and commits the file, overwriting any existing one.
    pub async fn finish(&mut self, chunk: Vec<u8>) -> Result<FileMetadata, UploadError> {
        self.expect_state(&[SessionState::Started, SessionState::Appending], "finish")?;

        let cursor = self.cursor()?;
        let commit = CommitInfo::overwrite(self.destination.as_str());
        let len = chunk.len() as u64;
        debug!(
            session_id = %cursor.session_id,
            offset = cursor.offset,
            bytes = len,
            "finishing session"
        );
        let result = self.api.session_finish(&cursor, &commit, chunk).await;
        let metadata = self.track(result)?;

        self.bytes_committed += len;
        self.state = SessionState::Finished;
        Ok(metadata)
    }

    /// Marks the session abandoned by the user. No request is made.
    pub fn cancel(&mut self) {
        if self.state != SessionState::Finished {
            if let Some(id) = &self.session_id {
                warn!(
                    session_id = %id,
                    committed = self.bytes_committed,
                    "upload session abandoned"
                );
            }
            self.state = SessionState::Cancelled;
        }
    }

    fn cursor(&self) -> Result<UploadCursor, UploadError> {
        let session_id = self
            .session_id
            .clone()
            .ok_or_else(|| UploadError::Session("session has no id".into()))?;
        Ok(UploadCursor {
            session_id,
            offset: self.bytes_committed,
        })
    }

    fn expect_state(&self, allowed: &[SessionState], op: &str) -> Result<(), UploadError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(UploadError::Session(format!(
                "cannot {op} a session in state {:?}",
                self.state
            )))
        }
    }

    fn track<T>(&mut self, result: Result<T, UploadError>) -> Result<T, UploadError> {
        if let Err(e) = &result {
            warn!(
                session_id = ?self.session_id,
                committed = self.bytes_committed,
                error = %e,
                "upload session failed"
            );
            self.state = SessionState::Failed;
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upload::api::ApiFuture;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// A request observed by [`MockDropbox`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Upload { path: String, len: usize },
        Start { len: usize },
        Append { session_id: String, offset: u64, len: usize },
        Finish { session_id: String, offset: u64, path: String, len: usize },
    }

    /// Records every call and can fail or cancel on a chosen call.
    #[derive(Default)]
    pub struct MockDropbox {
        calls: Mutex<Vec<Call>>,
        fail_on: Mutex<Option<(usize, UploadError)>>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl MockDropbox {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the `n`th call (1-based) return `err`.
        pub fn fail_on(self, n: usize, err: UploadError) -> Self {
            *self.fail_on.lock().unwrap() = Some((n, err));
            self
        }

        /// Cancels `token` once the `n`th call (1-based) has succeeded.
        pub fn cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
            self.cancel_after = Some((n, token));
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> Result<(), UploadError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(call);
                calls.len()
            };
            let mut fail_on = self.fail_on.lock().unwrap();
            if fail_on.as_ref().is_some_and(|(at, _)| *at == n) {
                let (_, err) = fail_on.take().unwrap();
                return Err(err);
            }
            if let Some((at, token)) = &self.cancel_after {
                if *at == n {
                    token.cancel();
                }
            }
            Ok(())
        }

        fn metadata(path: &str) -> FileMetadata {
            FileMetadata {
                name: path.rsplit('/').next().unwrap_or_default().to_string(),
                path_display: path.to_string(),
                rev: "rev-1".into(),
            }
        }
    }

    impl DropboxApi for MockDropbox {
        fn upload(&self, path: &str, body: Vec<u8>) -> ApiFuture<'_, FileMetadata> {
            let path = path.to_string();
            Box::pin(async move {
                self.record(Call::Upload {
                    path: path.clone(),
                    len: body.len(),
                })?;
                Ok(Self::metadata(&path))
            })
        }

        fn session_start(&self, body: Vec<u8>) -> ApiFuture<'_, String> {
            Box::pin(async move {
                self.record(Call::Start { len: body.len() })?;
                Ok("sess-1".to_string())
            })
        }

        fn session_append(&self, cursor: &UploadCursor, body: Vec<u8>) -> ApiFuture<'_, ()> {
            let cursor = cursor.clone();
            Box::pin(async move {
                self.record(Call::Append {
                    session_id: cursor.session_id,
                    offset: cursor.offset,
                    len: body.len(),
                })
            })
        }

        fn session_finish(
            &self,
            cursor: &UploadCursor,
            commit: &CommitInfo,
            body: Vec<u8>,
        ) -> ApiFuture<'_, FileMetadata> {
            let cursor = cursor.clone();
            let path = commit.path.clone();
            Box::pin(async move {
                self.record(Call::Finish {
                    session_id: cursor.session_id,
                    offset: cursor.offset,
                    path: path.clone(),
                    len: body.len(),
                })?;
                Ok(Self::metadata(&path))
            })
        }
    }

    #[tokio::test]
    async fn full_lifecycle() {
        let mock = MockDropbox::new();
        let mut session = UploadSession::new(&mock, "/dest/file.bin");
        assert_eq!(session.state(), SessionState::Unstarted);

        assert_eq!(session.start(vec![0; 4]).await.unwrap(), "sess-1");
        assert_eq!(session.state(), SessionState::Started);
        assert_eq!(session.bytes_committed(), 4);

        session.append(vec![0; 4]).await.unwrap();
        assert_eq!(session.state(), SessionState::Appending);
        assert_eq!(session.bytes_committed(), 8);

        let meta = session.finish(vec![0; 2]).await.unwrap();
        assert_eq!(session.state(), SessionState::Finished);
        assert_eq!(session.bytes_committed(), 10);
        assert_eq!(meta.path_display, "/dest/file.bin");

        assert_eq!(
            mock.calls(),
            vec![
                Call::Start { len: 4 },
                Call::Append { session_id: "sess-1".into(), offset: 4, len: 4 },
                Call::Finish {
                    session_id: "sess-1".into(),
                    offset: 8,
                    path: "/dest/file.bin".into(),
                    len: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn finish_directly_after_start() {
        let mock = MockDropbox::new();
        let mut session = UploadSession::new(&mock, "/a");
        session.start(vec![0; 8]).await.unwrap();
        session.finish(vec![0; 3]).await.unwrap();
        assert_eq!(session.bytes_committed(), 11);
    }

    #[tokio::test]
    async fn append_before_start_rejected_without_request() {
        let mock = MockDropbox::new();
        let mut session = UploadSession::new(&mock, "/a");
        let err = session.append(vec![0; 4]).await.unwrap_err();
        assert!(matches!(err, UploadError::Session(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn start_twice_rejected() {
        let mock = MockDropbox::new();
        let mut session = UploadSession::new(&mock, "/a");
        session.start(vec![0; 4]).await.unwrap();
        assert!(matches!(
            session.start(vec![0; 4]).await,
            Err(UploadError::Session(_))
        ));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn no_calls_after_finish() {
        let mock = MockDropbox::new();
        let mut session = UploadSession::new(&mock, "/a");
        session.start(vec![0; 4]).await.unwrap();
        session.finish(vec![0; 4]).await.unwrap();
        assert!(session.append(vec![0; 4]).await.is_err());
        assert!(session.finish(vec![0; 4]).await.is_err());
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn server_error_fails_session() {
        let mock = MockDropbox::new().fail_on(2, UploadError::Api("incorrect_offset".into()));
        let mut session = UploadSession::new(&mock, "/a");
        session.start(vec![0; 4]).await.unwrap();

        let err = session.append(vec![0; 4]).await.unwrap_err();
        assert!(matches!(err, UploadError::Api(_)));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.bytes_committed(), 4);

        // A failed session accepts nothing further.
        assert!(matches!(
            session.append(vec![0; 4]).await,
            Err(UploadError::Session(_))
        ));
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn cancel_marks_state() {
        let mock = MockDropbox::new();
        let mut session = UploadSession::new(&mock, "/a");
        session.start(vec![0; 4]).await.unwrap();
        session.cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(session.append(vec![0; 4]).await.is_err());
        assert_eq!(mock.calls().len(), 1);
    }
}
