//! Transcription output types

use serde::Serialize;

use super::midi::MidiDocument;

/// A detected note
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    /// Onset in seconds from the start of the recording
    pub start_seconds: f64,
    /// Release in seconds from the start of the recording
    pub end_seconds: f64,
    /// MIDI key number (60 = middle C)
    pub pitch: u8,
    /// MIDI velocity, 1-127
    pub velocity: u8,
    /// Mean detected fundamental frequency in Hz
    pub frequency_hz: f32,
}

impl NoteEvent {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

/// Result of one `predict` call
#[derive(Debug, Clone)]
pub struct Prediction {
    pub note_events: Vec<NoteEvent>,
    pub midi: MidiDocument,
}

impl Prediction {
    /// Build the prediction, placing `note_events` into `template`
    pub fn from_notes(note_events: Vec<NoteEvent>, template: MidiDocument) -> Self {
        let midi = template.with_notes(note_events.clone());
        Self { note_events, midi }
    }

    pub fn note_count(&self) -> usize {
        self.note_events.len()
    }
}

/// Convert a frequency to the nearest MIDI key, if it is inside 0-127
pub fn frequency_to_midi(frequency_hz: f32) -> Option<u8> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return None;
    }
    let key = (69.0 + 12.0 * (frequency_hz / 440.0).log2()).round();
    if (0.0..=127.0).contains(&key) {
        Some(key as u8)
    } else {
        None
    }
}
