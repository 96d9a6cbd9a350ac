//! Error types for tonemill-server
//!
//! [`ConvertError`] is the closed failure taxonomy of the conversion pipeline.
//! Every variant is turned into an HTTP response through
//! [`crate::pipeline::classifier::classify`].

use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::model::{MidiError, ModelError};
use crate::pipeline::classifier::classify;

/// Reason an upload was refused before any resource was allocated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No `file` part with a filename in the request
    #[error("No file provided")]
    MissingFile,

    /// File part present but the declared filename is empty
    #[error("No file selected")]
    EmptyFilename,

    /// Extension outside the configured allow-set
    #[error("Unsupported file type. Allowed: {}", .allowed.join(", "))]
    UnsupportedType {
        /// Extension found on the declared filename, if any
        extension: Option<String>,
        /// Configured allow-set, in configured order
        allowed: Vec<String>,
    },

    /// Zero-byte upload
    #[error("Empty file")]
    EmptyContent,

    /// Upload exceeds the size ceiling
    #[error("File too large (max {})", human_size(.max_bytes))]
    TooLarge {
        /// Configured ceiling in bytes
        max_bytes: usize,
    },
}

/// Pipeline failure
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Upload failed validation (400)
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Model failed to load at startup (500)
    #[error("Transcription model unavailable: {0}")]
    ModelUnavailable(String),

    /// Transcriber returned an error (500)
    #[error(transparent)]
    Model(#[from] ModelError),

    /// MIDI document could not be serialized (500)
    #[error(transparent)]
    Midi(#[from] MidiError),

    /// Serialized MIDI buffer was empty (500)
    #[error("Generated MIDI file is empty")]
    EmptyResult,

    /// Model invocation exceeded its time limit (500)
    #[error("Conversion timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// Anything the pipeline did not anticipate (500)
    #[error("Unhandled fault: {0}")]
    Unhandled(String),
}

impl ConvertError {
    /// Wrap an unexpected error, keeping its full source chain for the log
    pub fn unhandled(context: &str, err: &(dyn std::error::Error + 'static)) -> Self {
        ConvertError::Unhandled(format!("{}: {}", context, error_chain(err)))
    }
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        classify(&self).into_response()
    }
}

/// Render an error and all of its sources, one per line
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    let mut depth = 0;
    while let Some(cause) = source {
        rendered.push_str(&format!("\n  {}: {}", depth, cause));
        depth += 1;
        source = cause.source();
    }
    rendered
}

/// Text of a panic payload, when it carries one
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Format a byte ceiling the way users read it ("10MB", "512KB", "100 bytes")
fn human_size(bytes: &usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    if *bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if *bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Result type for pipeline operations
pub type ConvertResult<T> = Result<T, ConvertError>;
