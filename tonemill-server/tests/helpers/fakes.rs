//! Stand-in transcribers with fixed behaviour

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonemill_server::model::{
    MidiDocument, ModelError, ModelHandle, NoteEvent, Prediction, Transcriber,
};

/// What a [`FakeTranscriber`] does when called
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Return these notes
    Notes(Vec<NoteEvent>),
    OutOfMemory,
    ModelFault,
    /// Unreadable input
    Unreadable,
    Panic,
    /// Sleep, then return one note
    Slow(Duration),
}

pub struct FakeTranscriber {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-transcriber"
    }

    fn predict(&self, audio_path: &Path) -> Result<Prediction, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(audio_path.exists(), "upload must be on disk during predict");

        match &self.behaviour {
            Behaviour::Notes(notes) => Ok(Prediction::from_notes(
                notes.clone(),
                MidiDocument::default(),
            )),
            Behaviour::OutOfMemory => Err(ModelError::OutOfMemory(
                "cannot allocate 8 GiB sample buffer".into(),
            )),
            Behaviour::ModelFault => Err(ModelError::Model("inference graph failed".into())),
            Behaviour::Unreadable => Err(ModelError::Other(
                anyhow::anyhow!("no decodable stream").context("Failed to probe audio file"),
            )),
            Behaviour::Panic => panic!("transcriber exploded"),
            Behaviour::Slow(delay) => {
                std::thread::sleep(*delay);
                Ok(Prediction::from_notes(vec![note(60)], MidiDocument::default()))
            }
        }
    }
}

pub fn note(pitch: u8) -> NoteEvent {
    NoteEvent {
        start_seconds: 0.0,
        end_seconds: 0.5,
        pitch,
        velocity: 96,
        frequency_hz: 440.0,
    }
}

/// Handle around a fake, keeping a reference for call counting
pub fn fake_model(behaviour: Behaviour) -> (ModelHandle, Arc<FakeTranscriber>) {
    let fake = FakeTranscriber::new(behaviour);
    (ModelHandle::ready(fake.clone()), fake)
}
