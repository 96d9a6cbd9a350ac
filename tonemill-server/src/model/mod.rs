//! Transcription model layer
//!
//! The pipeline only sees the [`Transcriber`] trait and the process-wide
//! [`ModelHandle`]. The model is loaded once in `main` before the listener
//! binds; a failed load leaves the handle unavailable for the lifetime of the
//! process and is never retried.

pub mod midi;
pub mod pitch_tracker;
pub mod types;

pub use midi::{MidiDocument, MidiError};
pub use pitch_tracker::{PitchTracker, PitchTrackerParams};
pub use types::{NoteEvent, Prediction};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Failure raised by a transcriber
///
/// The category is decided where the failure happens, not by inspecting the
/// rendered message afterwards.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Input too large to hold in memory
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The model itself faulted (inference error, panic, bad state)
    #[error("Model failure: {0}")]
    Model(String),

    /// Anything else (unreadable audio, I/O)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Audio-to-notes capability
///
/// `predict` is synchronous and may take seconds; callers run it on a
/// blocking thread.
pub trait Transcriber: Send + Sync {
    /// Identifier reported by `/health`
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio_path`
    fn predict(&self, audio_path: &Path) -> Result<Prediction, ModelError>;
}

enum ModelState {
    Ready(Arc<dyn Transcriber>),
    Unavailable(String),
}

/// Shared, read-only handle to the loaded model
///
/// Cloning is cheap; all clones see the same model.
#[derive(Clone)]
pub struct ModelHandle {
    state: Arc<ModelState>,
}

impl ModelHandle {
    /// Wrap an already constructed transcriber
    pub fn ready(transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            state: Arc::new(ModelState::Ready(transcriber)),
        }
    }

    /// Handle whose every use fails with `reason`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: Arc::new(ModelState::Unavailable(reason.into())),
        }
    }

    /// Load the pitch tracker from its artifact
    ///
    /// Never fails: a load error yields an unavailable handle.
    pub fn load(artifact_path: &Path) -> Self {
        match PitchTracker::from_artifact(artifact_path) {
            Ok(tracker) => {
                info!(
                    model = tracker.name(),
                    path = %artifact_path.display(),
                    "Transcription model loaded"
                );
                Self::ready(Arc::new(tracker))
            }
            Err(e) => {
                error!(
                    path = %artifact_path.display(),
                    "Failed to load transcription model: {:#}",
                    e
                );
                Self::unavailable(format!("{:#}", e))
            }
        }
    }

    /// The transcriber, or the reason it could not be loaded
    pub fn transcriber(&self) -> Result<Arc<dyn Transcriber>, String> {
        match self.state.as_ref() {
            ModelState::Ready(transcriber) => Ok(Arc::clone(transcriber)),
            ModelState::Unavailable(reason) => Err(reason.clone()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state.as_ref(), ModelState::Ready(_))
    }

    /// Model name when loaded
    pub fn name(&self) -> Option<String> {
        match self.state.as_ref() {
            ModelState::Ready(transcriber) => Some(transcriber.name().to_string()),
            ModelState::Unavailable(_) => None,
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state.as_ref() {
            ModelState::Ready(transcriber) => f
                .debug_struct("ModelHandle")
                .field("model", &transcriber.name())
                .finish(),
            ModelState::Unavailable(reason) => f
                .debug_struct("ModelHandle")
                .field("unavailable", reason)
                .finish(),
        }
    }
}
