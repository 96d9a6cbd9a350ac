//! MIDI document and Standard MIDI File serialization

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use thiserror::Error;

use super::types::NoteEvent;

/// Largest tempo value a Set Tempo meta event can carry (24 bits)
const MAX_MICROSECONDS_PER_QUARTER: u32 = 0x00FF_FFFF;

const TRACK_NAME: &[u8] = b"Transcription";

/// MIDI serialization errors
#[derive(Debug, Error)]
pub enum MidiError {
    /// Tempo or resolution cannot be encoded
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Writer failed
    #[error("MIDI write failed: {0}")]
    Write(String),
}

/// A single-track note sequence
#[derive(Debug, Clone, PartialEq)]
pub struct MidiDocument {
    /// Pulses per quarter note
    pub ticks_per_quarter: u16,
    /// Tempo used to map seconds to ticks
    pub tempo_bpm: f64,
    /// General MIDI program (0 = acoustic grand piano)
    pub program: u8,
    /// MIDI channel, 0-15
    pub channel: u8,
    pub notes: Vec<NoteEvent>,
}

impl Default for MidiDocument {
    fn default() -> Self {
        Self {
            ticks_per_quarter: 480,
            tempo_bpm: 120.0,
            program: 0,
            channel: 0,
            notes: Vec::new(),
        }
    }
}

impl MidiDocument {
    pub fn new(ticks_per_quarter: u16, tempo_bpm: f64, program: u8) -> Self {
        Self {
            ticks_per_quarter,
            tempo_bpm,
            program,
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: Vec<NoteEvent>) -> Self {
        self.notes = notes;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    fn microseconds_per_quarter(&self) -> Result<u32, MidiError> {
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(MidiError::InvalidTiming(format!(
                "tempo must be positive, got {}",
                self.tempo_bpm
            )));
        }
        let uspq = (60_000_000.0 / self.tempo_bpm).round();
        if uspq < 1.0 || uspq > MAX_MICROSECONDS_PER_QUARTER as f64 {
            return Err(MidiError::InvalidTiming(format!(
                "tempo {} BPM does not fit a MIDI tempo event",
                self.tempo_bpm
            )));
        }
        Ok(uspq as u32)
    }

    /// Convert a time in seconds to an absolute tick
    pub fn seconds_to_ticks(&self, seconds: f64) -> u32 {
        let beats = seconds.max(0.0) * self.tempo_bpm / 60.0;
        (beats * self.ticks_per_quarter as f64).round() as u32
    }

    /// Serialize as a format-0 Standard MIDI File
    ///
    /// A document without notes writes nothing: there is no musical content
    /// to export.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), MidiError> {
        if self.notes.is_empty() {
            return Ok(());
        }

        if self.ticks_per_quarter == 0 || self.ticks_per_quarter > 0x7FFF {
            return Err(MidiError::InvalidTiming(format!(
                "ticks per quarter must be 1-32767, got {}",
                self.ticks_per_quarter
            )));
        }
        let tempo = self.microseconds_per_quarter()?;
        let channel = u4::from(self.channel.min(15));

        // (absolute tick, sort rank, event); note-offs sort before note-ons
        // on the same tick so repeated keys retrigger cleanly
        let mut timed: Vec<(u32, u8, TrackEventKind<'static>)> =
            Vec::with_capacity(self.notes.len() * 2);
        for note in &self.notes {
            let key = u7::from(note.pitch.min(127));
            let vel = u7::from(note.velocity.clamp(1, 127));
            let start = self.seconds_to_ticks(note.start_seconds);
            let end = self.seconds_to_ticks(note.end_seconds).max(start + 1);

            timed.push((
                start,
                1,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn { key, vel },
                },
            ));
            timed.push((
                end,
                0,
                TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key,
                        vel: u7::from(0),
                    },
                },
            ));
        }
        timed.sort_by_key(|(tick, rank, _)| (*tick, *rank));

        let mut track: Vec<TrackEvent<'static>> = Vec::with_capacity(timed.len() + 4);
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(TRACK_NAME)),
        });
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo))),
        });
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::from(self.program.min(127)),
                },
            },
        });

        let mut last_tick = 0u32;
        for (tick, _, kind) in timed {
            track.push(TrackEvent {
                delta: u28::from(tick - last_tick),
                kind,
            });
            last_tick = tick;
        }
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header::new(
                Format::SingleTrack,
                Timing::Metrical(u15::from(self.ticks_per_quarter)),
            ),
            tracks: vec![track],
        };

        smf.write(out)
            .map_err(|e| MidiError::Write(e.to_string()))?;
        Ok(())
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, MidiError> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(start: f64, end: f64, pitch: u8) -> NoteEvent {
        NoteEvent {
            start_seconds: start,
            end_seconds: end,
            pitch,
            velocity: 90,
            frequency_hz: 440.0,
        }
    }

    #[test]
    fn test_empty_document_writes_nothing() {
        let bytes = MidiDocument::default().to_bytes().unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_written_file_parses_back() {
        let doc = MidiDocument::default().with_notes(vec![
            note(0.0, 0.5, 60),
            note(0.5, 1.0, 64),
            note(1.0, 2.0, 67),
        ]);
        let bytes = doc.to_bytes().unwrap();

        assert_eq!(&bytes[..4], b"MThd");
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);

        let note_ons: Vec<u8> = smf.tracks[0]
            .iter()
            .filter_map(|event| match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, vel },
                    ..
                } if vel.as_int() > 0 => Some(key.as_int()),
                _ => None,
            })
            .collect();
        assert_eq!(note_ons, vec![60, 64, 67]);
    }

    #[test]
    fn test_seconds_to_ticks_at_120_bpm() {
        let doc = MidiDocument::default();
        // 120 BPM: one quarter note per half second
        assert_eq!(doc.seconds_to_ticks(0.5), 480);
        assert_eq!(doc.seconds_to_ticks(2.0), 1920);
        assert_eq!(doc.seconds_to_ticks(-1.0), 0);
    }

    #[test]
    fn test_invalid_tempo_rejected() {
        let doc = MidiDocument::new(480, 0.0, 0).with_notes(vec![note(0.0, 1.0, 60)]);
        assert!(matches!(doc.to_bytes(), Err(MidiError::InvalidTiming(_))));

        let doc = MidiDocument::new(0, 120.0, 0).with_notes(vec![note(0.0, 1.0, 60)]);
        assert!(matches!(doc.to_bytes(), Err(MidiError::InvalidTiming(_))));
    }

    #[test]
    fn test_same_document_same_bytes() {
        let doc = MidiDocument::default().with_notes(vec![note(0.25, 0.75, 69)]);
        assert_eq!(doc.to_bytes().unwrap(), doc.to_bytes().unwrap());
    }
}
