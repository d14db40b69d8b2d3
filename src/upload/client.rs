use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::upload::api::{ApiFuture, CommitInfo, DropboxApi, FileMetadata, UploadCursor};
use crate::upload::error::UploadError;

pub const DEFAULT_CONTENT_URL: &str = "https://content.dropboxapi.com/2";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";
const USER_AGENT: &str = concat!("dox/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed [`DropboxApi`] using a pre-authorised bearer token.
pub struct DropboxClient {
    http: Client,
    base_url: String,
    token: String,
}

impl DropboxClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self> {
        Self::with_base_url(token, timeout, DEFAULT_CONTENT_URL)
    }

    /// Builds a client against another content endpoint.
    pub fn with_base_url(token: &str, timeout: Duration, base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn call<A: Serialize>(
        &self,
        endpoint: &str,
        arg: &A,
        body: Vec<u8>,
    ) -> Result<String, UploadError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let arg = header_safe_json(arg)?;
        let arg = HeaderValue::from_str(&arg)
            .map_err(|e| UploadError::BadInput(format!("invalid API argument: {e}")))?;

        debug!(endpoint, bytes = body.len(), "dropbox request");

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(API_ARG_HEADER, arg)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }
        Ok(text)
    }
}

impl DropboxApi for DropboxClient {
    fn upload(&self, path: &str, body: Vec<u8>) -> ApiFuture<'_, FileMetadata> {
        let arg = CommitInfo::overwrite(path);
        Box::pin(async move {
            let text = self.call("files/upload", &arg, body).await?;
            parse_json(&text)
        })
    }

    fn session_start(&self, body: Vec<u8>) -> ApiFuture<'_, String> {
        Box::pin(async move {
            let text = self
                .call("files/upload_session/start", &StartArg { close: false }, body)
                .await?;
            let result: StartResult = parse_json(&text)?;
            Ok(result.session_id)
        })
    }

    fn session_append(&self, cursor: &UploadCursor, body: Vec<u8>) -> ApiFuture<'_, ()> {
        let arg = AppendArg {
            cursor: cursor.clone(),
            close: false,
        };
        Box::pin(async move {
            self.call("files/upload_session/append_v2", &arg, body).await?;
            Ok(())
        })
    }

    fn session_finish(
        &self,
        cursor: &UploadCursor,
        commit: &CommitInfo,
        body: Vec<u8>,
    ) -> ApiFuture<'_, FileMetadata> {
        let arg = FinishArg {
            cursor: cursor.clone(),
            commit: commit.clone(),
        };
        Box::pin(async move {
            let text = self.call("files/upload_session/finish", &arg, body).await?;
            parse_json(&text)
        })
    }
}

#[derive(Debug, Serialize)]
struct StartArg {
    close: bool,
}

#[derive(Debug, Deserialize)]
struct StartResult {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct AppendArg {
    cursor: UploadCursor,
    close: bool,
}

#[derive(Debug, Serialize)]
struct FinishArg {
    cursor: UploadCursor,
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_summary: Option<String>,
}

/// Serialises `arg` to JSON safe for an HTTP header: non-ASCII is `\u`-escaped.
fn header_safe_json<A: Serialize>(arg: &A) -> Result<String, UploadError> {
    let json = serde_json::to_string(arg)
        .map_err(|e| UploadError::BadInput(format!("failed to encode API argument: {e}")))?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

fn parse_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, UploadError> {
    serde_json::from_str(text)
        .map_err(|e| UploadError::Http(format!("unexpected response body: {e}")))
}

fn transport_error(err: reqwest::Error) -> UploadError {
    if err.is_timeout() {
        UploadError::Timeout(err.to_string())
    } else {
        UploadError::Http(err.to_string())
    }
}

/// Maps a non-success response onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> UploadError {
    let summary = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error_summary)
        .unwrap_or_else(|| body.trim().to_string());
    let detail = format!("{status}: {summary}");

    match status {
        StatusCode::BAD_REQUEST => UploadError::BadInput(detail),
        StatusCode::UNAUTHORIZED => UploadError::Auth(detail),
        StatusCode::FORBIDDEN => UploadError::Access(detail),
        StatusCode::CONFLICT if is_access_conflict(&summary) => UploadError::Access(detail),
        StatusCode::CONFLICT => UploadError::Api(detail),
        StatusCode::TOO_MANY_REQUESTS => UploadError::RateLimit(detail),
        _ => UploadError::Http(detail),
    }
}

fn is_access_conflict(summary: &str) -> bool {
    ["conflict", "no_write_permission", "insufficient_space", "disallowed_name"]
        .iter()
        .any(|tag| summary.contains(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_json_escapes_non_ascii() {
        let arg = CommitInfo::overwrite("/Fotos/café 📷.jpg");
        let json = header_safe_json(&arg).unwrap();
        assert!(json.is_ascii());
        assert!(json.contains(r"caf\u00e9"));
        assert!(json.contains(r"\ud83d\udcf7"));
        assert!(HeaderValue::from_str(&json).is_ok());
    }

    #[test]
    fn append_arg_wire_format() {
        let arg = AppendArg {
            cursor: UploadCursor {
                session_id: "sess-1".into(),
                offset: 4096,
            },
            close: false,
        };
        assert_eq!(
            header_safe_json(&arg).unwrap(),
            r#"{"cursor":{"session_id":"sess-1","offset":4096},"close":false}"#
        );
    }

    #[test]
    fn classify_status_codes() {
        let expired =
            r#"{"error_summary":"expired_access_token/","error":{".tag":"expired_access_token"}}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "Error in call: bad path"),
            UploadError::BadInput(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, expired),
            UploadError::Auth(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, "{}"),
            UploadError::Access(_)
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::TOO_MANY_REQUESTS,
                r#"{"error_summary":"too_many_write_operations/"}"#
            ),
            UploadError::RateLimit(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream"),
            UploadError::Http(_)
        ));
    }

    #[test]
    fn classify_conflicts() {
        let err = classify_failure(
            StatusCode::CONFLICT,
            r#"{"error_summary":"path/conflict/file/..","error":{}}"#,
        );
        assert!(matches!(err, UploadError::Access(_)));

        let err = classify_failure(
            StatusCode::CONFLICT,
            r#"{"error_summary":"incorrect_offset/..","error":{}}"#,
        );
        match err {
            UploadError::Api(detail) => assert!(detail.contains("incorrect_offset")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client =
            DropboxClient::with_base_url("t", Duration::from_secs(5), "http://localhost:9/2/")
                .unwrap();
        assert_eq!(client.base_url, "http://localhost:9/2");
    }
}
