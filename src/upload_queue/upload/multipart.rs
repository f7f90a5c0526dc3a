//! Multipart body construction.
//!
//! Parts go out in a fixed order: `file`, `token`, then `path` when a
//! destination is set. The file is streamed from disk, capped at the length
//! seen when the form was built, so a file that keeps growing is sent as a
//! consistent snapshot.

use crate::error::UploaderError;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::io::{InspectReader, ReaderStream};

pub const FILE_FIELD: &str = "file";
pub const TOKEN_FIELD: &str = "token";
pub const PATH_FIELD: &str = "path";

const FILE_MIME: &str = "application/octet-stream";

/// A ready-to-send form and the byte length announced for the file part
pub struct UploadForm {
    pub form: Form,
    pub file_len: u64,
    /// Running count of file bytes read into the body
    pub sent: Arc<AtomicU64>,
}

impl UploadForm {
    /// File bytes actually read into the request body so far
    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

pub async fn build_form(
    path: &Path,
    token: &str,
    destination: Option<&str>,
) -> Result<UploadForm, UploaderError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| UploaderError::file_unreadable(path, e))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| UploaderError::file_unreadable(path, e))?;

    if !metadata.is_file() {
        return Err(UploaderError::file_unreadable(path, "not a regular file"));
    }

    let file_len = metadata.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| UploaderError::file_unreadable(path, "path has no file name"))?;

    let sent = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&sent);
    // Never stream past the announced length or the multipart framing breaks
    let reader = InspectReader::new(file.take(file_len), move |chunk: &[u8]| {
        counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    });

    let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
    let part = Part::stream_with_length(body, file_len)
        .file_name(file_name)
        .mime_str(FILE_MIME)?;

    let mut form = Form::new()
        .part(FILE_FIELD, part)
        .text(TOKEN_FIELD, token.to_string());

    if let Some(destination) = destination_field(destination) {
        form = form.text(PATH_FIELD, destination);
    }

    Ok(UploadForm {
        form,
        file_len,
        sent,
    })
}

/// Blank destinations are omitted from the request entirely
pub fn destination_field(destination: Option<&str>) -> Option<String> {
    destination
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_destination_field() {
        assert_eq!(destination_field(None), None);
        assert_eq!(destination_field(Some("")), None);
        assert_eq!(destination_field(Some("   ")), None);
        assert_eq!(
            destination_field(Some(" clips/2026 ")),
            Some("clips/2026".to_string())
        );
    }

    #[tokio::test]
    async fn test_build_form_reports_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.wbmomo");
        std::fs::write(&path, vec![7u8; 2048]).unwrap();

        let built = build_form(&path, "tok", Some("dest")).await.unwrap();
        assert_eq!(built.file_len, 2048);
        assert_eq!(built.bytes_sent(), 0);
        assert!(!built.form.boundary().is_empty());
    }

    #[tokio::test]
    async fn test_build_form_missing_file_is_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.wbmomo");

        let err = build_form(&path, "tok", None).await.err().unwrap();
        assert!(matches!(err, UploaderError::FileUnreadable { .. }));
    }

    #[tokio::test]
    async fn test_build_form_rejects_directory() {
        let dir = tempdir().unwrap();
        let err = build_form(dir.path(), "tok", None).await.err().unwrap();
        assert!(matches!(err, UploaderError::FileUnreadable { .. }));
    }
}
