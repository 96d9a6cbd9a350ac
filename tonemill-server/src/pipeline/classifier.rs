//! Failure classification
//!
//! Maps every [`ConvertError`] to a category, status code and user-facing
//! text. The category comes from the error's variant, never from its
//! rendered message.

use axum::http::StatusCode;
use serde::Serialize;

use crate::error::{error_chain, ConvertError, Rejection};
use crate::model::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingFile,
    EmptyFilename,
    UnsupportedType,
    TooLarge,
    EmptyContent,
    ModelUnavailable,
    MemoryError,
    ModelFailure,
    ConversionFailed,
    ConversionTimeout,
    EmptyResult,
    ServerError,
}

impl ErrorCategory {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCategory::MissingFile
            | ErrorCategory::EmptyFilename
            | ErrorCategory::UnsupportedType
            | ErrorCategory::TooLarge
            | ErrorCategory::EmptyContent => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(self) -> bool {
        self.status().is_client_error()
    }
}

/// Classified failure, ready to be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub status: StatusCode,
    /// Short user-facing summary
    pub message: String,
    /// Underlying error text
    pub detail: Option<String>,
    /// What the caller can do about it
    pub suggestion: Option<String>,
    /// Full error chain, for unexpected conversion failures only
    pub trace: Option<String>,
}

impl ErrorReport {
    fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status: category.status(),
            message: message.into(),
            detail: None,
            suggestion: None,
            trace: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.suggestion = Some(suggestion.to_string());
        self
    }

    fn with_trace(mut self, trace: String) -> Self {
        self.trace = Some(trace);
        self
    }
}

const CONVERSION_FAILED: &str = "Conversion failed";

pub fn classify(err: &ConvertError) -> ErrorReport {
    match err {
        ConvertError::Rejected(rejection) => classify_rejection(rejection),

        ConvertError::ModelUnavailable(reason) => {
            ErrorReport::new(ErrorCategory::ModelUnavailable, "Transcription model is not available")
                .with_detail(reason.clone())
                .with_suggestion(
                    "The transcription model failed to initialize on the server. \
                     Check the model artifact and restart the service",
                )
        }

        ConvertError::Model(ModelError::OutOfMemory(_)) => {
            ErrorReport::new(ErrorCategory::MemoryError, CONVERSION_FAILED)
                .with_detail(err.to_string())
                .with_suggestion("Not enough memory to process this file. Try again with a smaller file")
        }

        ConvertError::Model(ModelError::Model(_)) => {
            ErrorReport::new(ErrorCategory::ModelFailure, CONVERSION_FAILED)
                .with_detail(err.to_string())
                .with_suggestion(
                    "The transcription model failed while processing this file. \
                     Check the model initialization on the server",
                )
        }

        ConvertError::Model(ModelError::Other(_)) | ConvertError::Midi(_) => {
            ErrorReport::new(ErrorCategory::ConversionFailed, CONVERSION_FAILED)
                .with_detail(err.to_string())
                .with_trace(error_chain(err))
        }

        ConvertError::EmptyResult => {
            ErrorReport::new(ErrorCategory::EmptyResult, err.to_string()).with_suggestion(
                "No notes were detected. Make sure the recording contains audible pitched sound",
            )
        }

        ConvertError::Timeout(_) => ErrorReport::new(ErrorCategory::ConversionTimeout, "Conversion timed out")
            .with_detail(err.to_string())
            .with_suggestion("Try again with a shorter recording"),

        // Internal detail stays in the log
        ConvertError::Unhandled(_) => ErrorReport::new(ErrorCategory::ServerError, "Server error"),
    }
}

fn classify_rejection(rejection: &Rejection) -> ErrorReport {
    let category = match rejection {
        Rejection::MissingFile => ErrorCategory::MissingFile,
        Rejection::EmptyFilename => ErrorCategory::EmptyFilename,
        Rejection::UnsupportedType { .. } => ErrorCategory::UnsupportedType,
        Rejection::EmptyContent => ErrorCategory::EmptyContent,
        Rejection::TooLarge { .. } => ErrorCategory::TooLarge,
    };
    let report = ErrorReport::new(category, rejection.to_string());

    match rejection {
        Rejection::UnsupportedType {
            extension: Some(extension),
            ..
        } => report.with_detail(format!("Received a '.{}' file", extension)),
        Rejection::UnsupportedType { extension: None, .. } => {
            report.with_detail("Filename has no extension")
        }
        _ => report,
    }
}
