//! Upload error taxonomy and process exit codes.

use std::io;

/// Process exit status reported by the `dox` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    UnknownError = 1,
    BadArguments = 2,
    FileNotFound = 3,
    AccessDenied = 4,
    Canceled = 5,
    TimedOut = 6,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// Errors produced while uploading a file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("access denied: {0}")]
    Access(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("bad input: {0}")]
    BadInput(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("upload session error: {0}")]
    Session(String),

    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// Maps the error onto the exit code the binary reports.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            UploadError::Auth(_) | UploadError::Access(_) => ExitCode::AccessDenied,
            UploadError::RateLimit(_) => ExitCode::Canceled,
            UploadError::BadInput(_) | UploadError::Http(_) => ExitCode::BadArguments,
            UploadError::Timeout(_) => ExitCode::TimedOut,
            UploadError::Cancelled => ExitCode::Canceled,
            UploadError::Io(e) if e.kind() == io::ErrorKind::NotFound => ExitCode::FileNotFound,
            UploadError::Io(_) | UploadError::Api(_) | UploadError::Session(_) => {
                ExitCode::UnknownError
            }
        }
    }

    /// True for a user-initiated abort, which is not reported as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}
