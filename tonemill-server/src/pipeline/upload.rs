//! Multipart upload extraction

use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;

use crate::error::{ConvertError, ConvertResult, Rejection};

/// Name of the multipart field carrying the recording
pub const FILE_FIELD: &str = "file";

/// Inbound upload, owned by one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Declared filename; `None` when the request carried no file part
    pub filename: Option<String>,
    /// Declared content type of the file part
    pub content_type: Option<String>,
    /// File bytes; reading stops one chunk past the size ceiling
    pub content: Vec<u8>,
}

impl UploadRequest {
    /// Upload with a file part
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: None,
            content,
        }
    }

    /// Request without any file part
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn has_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// Pull the `file` part out of a multipart body
///
/// Parts with other names, and a `file` part without a filename attribute,
/// are ignored. At most one chunk beyond `max_bytes` is buffered: that is
/// enough for validation to reject the upload as too large.
pub async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> ConvertResult<UploadRequest> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_failure(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            tracing::debug!("Ignoring '{}' part without filename", FILE_FIELD);
            continue;
        };
        let content_type = field.content_type().map(str::to_string);

        let mut content = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_failure(e, max_bytes))?
        {
            content.extend_from_slice(&chunk);
            if content.len() > max_bytes {
                break;
            }
        }

        return Ok(UploadRequest {
            filename: Some(filename),
            content_type,
            content,
        });
    }

    Ok(UploadRequest::missing())
}

/// Map a multipart parse failure onto the validation taxonomy
///
/// Hitting the body limit means the file is too large; any other malformed
/// body is treated as carrying no usable file part.
fn multipart_failure(err: MultipartError, max_bytes: usize) -> ConvertError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::debug!("Multipart body exceeded limit: {}", err.body_text());
        Rejection::TooLarge { max_bytes }.into()
    } else {
        tracing::debug!("Malformed multipart body: {}", err.body_text());
        Rejection::MissingFile.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_upload_has_no_file() {
        let upload = UploadRequest::missing();
        assert!(!upload.has_file());
        assert!(upload.content.is_empty());
    }

    #[test]
    fn test_new_upload_has_file() {
        let upload = UploadRequest::new("take1.wav", vec![1, 2, 3]);
        assert!(upload.has_file());
        assert_eq!(upload.filename.as_deref(), Some("take1.wav"));
        assert_eq!(upload.content.len(), 3);
    }
}
