//! Model invocation
//!
//! Inference is CPU-bound and synchronous, so it runs on tokio's blocking
//! pool. A semaphore bounds how many inferences run at once and every
//! invocation is subject to a time limit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::error::{panic_message, ConvertError, ConvertResult};
use crate::model::{ModelError, ModelHandle, Transcriber};

/// Serialized transcription of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Standard MIDI File bytes, never empty
    pub midi_bytes: Vec<u8>,
    pub note_count: usize,
}

#[derive(Debug, Clone)]
pub struct ConversionInvoker {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
}

impl ConversionInvoker {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
        }
    }

    /// Slots not currently held by a running inference
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transcribe the file at `audio_path`
    ///
    /// Waiting for a slot does not count against the time limit. On timeout
    /// the blocking task is abandoned, not killed: it keeps its slot until
    /// the model returns, so a stuck model cannot be oversubscribed.
    pub async fn convert(&self, audio_path: &Path, model: &ModelHandle) -> ConvertResult<Conversion> {
        let transcriber = model.transcriber().map_err(ConvertError::ModelUnavailable)?;

        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| ConvertError::unhandled("conversion slots closed", &e))?;
        debug!(
            available = self.slots.available_permits(),
            "Conversion slot acquired"
        );

        let path: PathBuf = audio_path.to_path_buf();
        let job = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_conversion(transcriber.as_ref(), &path)
        });

        match tokio::time::timeout(self.timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(join_failure(join_error)),
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Conversion exceeded time limit"
                );
                Err(ConvertError::Timeout(self.timeout))
            }
        }
    }
}

/// Run the transcriber and serialize its output
///
/// An empty serialized document is a failure: callers never see a
/// zero-byte MIDI file.
pub fn run_conversion(transcriber: &dyn Transcriber, audio_path: &Path) -> ConvertResult<Conversion> {
    let started = Instant::now();

    let prediction = transcriber.predict(audio_path)?;
    let note_count = prediction.note_count();
    let midi_bytes = prediction.midi.to_bytes()?;

    info!(
        model = transcriber.name(),
        notes = note_count,
        bytes = midi_bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Transcription finished"
    );

    if midi_bytes.is_empty() {
        return Err(ConvertError::EmptyResult);
    }

    Ok(Conversion {
        midi_bytes,
        note_count,
    })
}

/// A panicking transcriber is a model fault
fn join_failure(err: JoinError) -> ConvertError {
    if err.is_panic() {
        let payload = err.into_panic();
        let message = panic_message(payload.as_ref());
        warn!("Transcriber panicked: {}", message);
        ModelError::Model(format!("transcriber panicked: {}", message)).into()
    } else {
        ConvertError::unhandled("conversion task cancelled", &err)
    }
}
