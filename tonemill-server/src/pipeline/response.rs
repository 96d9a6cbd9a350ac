//! HTTP responses for conversion outcomes

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use std::any::Any;

use super::classifier::{classify, ErrorCategory, ErrorReport};
use super::invoker::Conversion;
use crate::error::{panic_message, ConvertError, ConvertResult};

pub const MIDI_MEDIA_TYPE: &str = "audio/midi";
pub const MIDI_FILENAME: &str = "converted.mid";
const MIDI_DISPOSITION: &str = "attachment; filename=\"converted.mid\"";

/// JSON body of a failed request
///
/// Client errors carry the detail as `message`; server errors carry it as
/// `details` next to an optional suggestion and trace.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<&'a str>,
}

impl<'a> From<&'a ErrorReport> for ErrorBody<'a> {
    fn from(report: &'a ErrorReport) -> Self {
        let detail = report.detail.as_deref();
        let client = report.category.is_client_error();
        Self {
            error: &report.message,
            category: report.category,
            message: if client { detail } else { None },
            details: if client { None } else { detail },
            suggestion: report.suggestion.as_deref(),
            trace: report.trace.as_deref(),
        }
    }
}

impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::from(&self))).into_response()
    }
}

/// Successful conversion as a downloadable MIDI file
pub fn midi_attachment(conversion: Conversion) -> Response {
    let length = HeaderValue::from(conversion.midi_bytes.len());
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(MIDI_MEDIA_TYPE)),
            (header::CONTENT_DISPOSITION, HeaderValue::from_static(MIDI_DISPOSITION)),
            (header::CONTENT_LENGTH, length),
        ],
        conversion.midi_bytes,
    )
        .into_response()
}

pub fn render(result: ConvertResult<Conversion>) -> Response {
    match result {
        Ok(conversion) => midi_attachment(conversion),
        Err(err) => err.into_response(),
    }
}

/// Response for a panic that escaped a handler
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    tracing::error!("Request handler panicked: {}", message);
    classify(&ConvertError::Unhandled(message)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Rejection;
    use crate::model::ModelError;
    use axum::http::StatusCode;

    fn body_json(report: &ErrorReport) -> serde_json::Value {
        serde_json::to_value(ErrorBody::from(report)).unwrap()
    }

    #[test]
    fn test_client_error_body() {
        let report = classify(
            &Rejection::UnsupportedType {
                extension: Some("txt".into()),
                allowed: vec!["wav".into()],
            }
            .into(),
        );
        let json = body_json(&report);
        assert_eq!(json["error"], "Unsupported file type. Allowed: wav");
        assert_eq!(json["category"], "unsupported_type");
        assert_eq!(json["message"], "Received a '.txt' file");
        assert!(json.get("details").is_none());
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn test_minimal_client_error_body() {
        let json = body_json(&classify(&Rejection::MissingFile.into()));
        assert_eq!(
            json,
            serde_json::json!({"error": "No file provided", "category": "missing_file"})
        );
    }

    #[test]
    fn test_server_error_body() {
        let report = classify(&ModelError::OutOfMemory("too long".into()).into());
        let json = body_json(&report);
        assert_eq!(json["error"], "Conversion failed");
        assert_eq!(json["category"], "memory_error");
        assert!(json["details"].as_str().unwrap().contains("too long"));
        assert!(json["suggestion"].as_str().is_some());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_midi_attachment_headers() {
        let response = midi_attachment(Conversion {
            midi_bytes: b"MThd".to_vec(),
            note_count: 1,
        });
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], MIDI_MEDIA_TYPE);
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            format!("attachment; filename=\"{}\"", MIDI_FILENAME).as_str()
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
    }

    #[tokio::test]
    async fn test_panic_response_is_generic() {
        use http_body_util::BodyExt;

        let response = panic_response(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "Server error", "category": "server_error"})
        );
    }
}
