//! Monophonic pitch tracker
//!
//! The built-in transcription model. Its "weights" are a small TOML artifact
//! of analysis parameters, read once at startup.
//!
//! **Algorithm:**
//! 1. Decode to mono and resample to the analysis rate
//! 2. Slice into overlapping frames; frames quieter than the silence
//!    threshold are unvoiced
//! 3. Estimate the fundamental of each voiced frame with the YIN cumulative
//!    mean normalized difference function, refined by parabolic interpolation
//! 4. Quantize to MIDI keys and merge runs of equal keys into notes
//!
//! Output is fully deterministic for a given input file.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;

use super::midi::MidiDocument;
use super::types::{frequency_to_midi, NoteEvent, Prediction};
use super::{ModelError, Transcriber};
use crate::utils::audio_decoder::{decode_audio_file, resample_mono};

/// Analysis parameters, as stored in the model artifact
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PitchTrackerParams {
    pub name: String,
    pub version: String,
    /// Rate the signal is resampled to before analysis (Hz)
    pub analysis_sample_rate: u32,
    /// Analysis window length in samples
    pub frame_size: usize,
    /// Distance between consecutive windows in samples
    pub hop_size: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// YIN aperiodicity threshold; lower is stricter
    pub yin_threshold: f32,
    /// Frames below this RMS level (dBFS) are unvoiced
    pub silence_threshold_db: f32,
    /// Notes shorter than this are discarded
    pub min_note_duration_ms: u32,
    /// Unvoiced frames bridged inside a single note
    pub max_gap_frames: usize,
    pub tempo_bpm: f64,
    pub ticks_per_quarter: u16,
    /// General MIDI program for the output track
    pub program: u8,
}

impl Default for PitchTrackerParams {
    fn default() -> Self {
        Self {
            name: "yin-pitch-tracker".to_string(),
            version: "1".to_string(),
            analysis_sample_rate: 11025,
            frame_size: 1024,
            hop_size: 256,
            min_frequency_hz: 65.0,
            max_frequency_hz: 1050.0,
            yin_threshold: 0.15,
            silence_threshold_db: -45.0,
            min_note_duration_ms: 128,
            max_gap_frames: 1,
            tempo_bpm: 120.0,
            ticks_per_quarter: 480,
            program: 0,
        }
    }
}

impl PitchTrackerParams {
    /// Shortest period searched, in samples
    fn min_lag(&self) -> usize {
        ((self.analysis_sample_rate as f32 / self.max_frequency_hz).floor() as usize).max(2)
    }

    /// Longest period searched, in samples
    fn max_lag(&self) -> usize {
        (self.analysis_sample_rate as f32 / self.min_frequency_hz).ceil() as usize
    }

    /// Reject parameter sets the analysis cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must not be empty");
        }
        if self.analysis_sample_rate < 4000 {
            bail!(
                "analysis_sample_rate must be at least 4000 Hz, got {}",
                self.analysis_sample_rate
            );
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            bail!(
                "hop_size must be in 1..=frame_size, got {} (frame_size {})",
                self.hop_size,
                self.frame_size
            );
        }
        if !(self.min_frequency_hz > 0.0 && self.min_frequency_hz < self.max_frequency_hz) {
            bail!(
                "frequency range {}-{} Hz is empty",
                self.min_frequency_hz,
                self.max_frequency_hz
            );
        }
        let nyquist = self.analysis_sample_rate as f32 / 2.0;
        if self.max_frequency_hz >= nyquist {
            bail!(
                "max_frequency_hz {} must be below Nyquist ({} Hz)",
                self.max_frequency_hz,
                nyquist
            );
        }
        if self.frame_size < 2 * self.max_lag() + 1 {
            bail!(
                "frame_size {} too short for {} Hz (needs at least {})",
                self.frame_size,
                self.min_frequency_hz,
                2 * self.max_lag() + 1
            );
        }
        if !(self.yin_threshold > 0.0 && self.yin_threshold < 1.0) {
            bail!("yin_threshold must be in (0, 1), got {}", self.yin_threshold);
        }
        if self.silence_threshold_db >= 0.0 {
            bail!(
                "silence_threshold_db must be negative, got {}",
                self.silence_threshold_db
            );
        }
        if !(self.tempo_bpm > 0.0) {
            bail!("tempo_bpm must be positive, got {}", self.tempo_bpm);
        }
        if self.ticks_per_quarter == 0 || self.ticks_per_quarter > 0x7FFF {
            bail!(
                "ticks_per_quarter must be 1-32767, got {}",
                self.ticks_per_quarter
            );
        }
        if self.program > 127 {
            bail!("program must be 0-127, got {}", self.program);
        }
        Ok(())
    }
}

/// Pitch estimate for one analysis frame
#[derive(Debug, Clone, Copy)]
struct FramePitch {
    key: u8,
    frequency_hz: f32,
    velocity: u8,
}

/// Note being extended while frames are scanned
struct PendingNote {
    key: u8,
    start_frame: usize,
    last_voiced_frame: usize,
    frequency_sum: f32,
    velocity_sum: u32,
    voiced_frames: u32,
}

impl PendingNote {
    fn start(frame: usize, pitch: FramePitch) -> Self {
        Self {
            key: pitch.key,
            start_frame: frame,
            last_voiced_frame: frame,
            frequency_sum: pitch.frequency_hz,
            velocity_sum: pitch.velocity as u32,
            voiced_frames: 1,
        }
    }

    fn extend(&mut self, frame: usize, pitch: FramePitch) {
        self.last_voiced_frame = frame;
        self.frequency_sum += pitch.frequency_hz;
        self.velocity_sum += pitch.velocity as u32;
        self.voiced_frames += 1;
    }
}

/// YIN-based monophonic transcriber
#[derive(Debug, Clone)]
pub struct PitchTracker {
    params: PitchTrackerParams,
    label: String,
}

impl PitchTracker {
    /// Build a tracker from validated parameters
    pub fn new(params: PitchTrackerParams) -> anyhow::Result<Self> {
        params.validate()?;
        let label = format!("{}@{}", params.name, params.version);
        Ok(Self { params, label })
    }

    /// Load the model artifact (TOML parameter file)
    pub fn from_artifact(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
        let params: PitchTrackerParams = toml::from_str(&content)
            .with_context(|| format!("Invalid model artifact {}", path.display()))?;
        Self::new(params).with_context(|| format!("Invalid model parameters in {}", path.display()))
    }

    pub fn params(&self) -> &PitchTrackerParams {
        &self.params
    }

    /// Detect notes in mono PCM at the analysis sample rate
    pub fn detect_notes(&self, samples: &[f32]) -> Vec<NoteEvent> {
        let p = &self.params;
        let mut notes = Vec::new();
        let mut pending: Option<PendingNote> = None;
        let mut scratch = Vec::with_capacity(p.max_lag() + 2);

        let mut frame_idx = 0usize;
        let mut offset = 0usize;
        while offset + p.frame_size <= samples.len() {
            let frame = &samples[offset..offset + p.frame_size];
            let pitch = self.analyze_frame(frame, &mut scratch);

            pending = match (pending.take(), pitch) {
                (Some(mut note), Some(pitch)) if note.key == pitch.key => {
                    note.extend(frame_idx, pitch);
                    Some(note)
                }
                (Some(note), Some(pitch)) => {
                    self.close_note(note, &mut notes);
                    Some(PendingNote::start(frame_idx, pitch))
                }
                (Some(note), None) => {
                    if frame_idx - note.last_voiced_frame > p.max_gap_frames {
                        self.close_note(note, &mut notes);
                        None
                    } else {
                        Some(note)
                    }
                }
                (None, Some(pitch)) => Some(PendingNote::start(frame_idx, pitch)),
                (None, None) => None,
            };

            frame_idx += 1;
            offset += p.hop_size;
        }

        if let Some(note) = pending {
            self.close_note(note, &mut notes);
        }

        notes
    }

    fn close_note(&self, note: PendingNote, notes: &mut Vec<NoteEvent>) {
        let p = &self.params;
        let sample_rate = p.analysis_sample_rate as f64;
        let start_seconds = (note.start_frame * p.hop_size) as f64 / sample_rate;
        let end_seconds = ((note.last_voiced_frame + 1) * p.hop_size) as f64 / sample_rate;

        if (end_seconds - start_seconds) * 1000.0 < p.min_note_duration_ms as f64 {
            return;
        }

        let count = note.voiced_frames.max(1);
        notes.push(NoteEvent {
            start_seconds,
            end_seconds,
            pitch: note.key,
            velocity: ((note.velocity_sum + count / 2) / count).clamp(1, 127) as u8,
            frequency_hz: note.frequency_sum / count as f32,
        });
    }

    /// Loudness gate followed by YIN period estimation
    fn analyze_frame(&self, frame: &[f32], cmnd: &mut Vec<f32>) -> Option<FramePitch> {
        let p = &self.params;

        let energy: f32 = frame.iter().map(|&s| s * s).sum();
        let rms = (energy / frame.len() as f32).sqrt();
        let level_db = 20.0 * rms.max(1e-10).log10();
        if level_db < p.silence_threshold_db {
            return None;
        }

        let min_lag = p.min_lag();
        let max_lag = p.max_lag();
        let window = frame.len() - max_lag - 1;

        // Cumulative mean normalized difference, lags 0..=max_lag+1
        cmnd.clear();
        cmnd.push(1.0);
        let mut running_sum = 0.0f32;
        for lag in 1..=max_lag + 1 {
            let diff: f32 = frame[..window]
                .iter()
                .zip(&frame[lag..lag + window])
                .map(|(a, b)| {
                    let d = a - b;
                    d * d
                })
                .sum();
            running_sum += diff;
            cmnd.push(if running_sum > 0.0 {
                diff * lag as f32 / running_sum
            } else {
                1.0
            });
        }

        let mut lag = min_lag;
        let mut found = None;
        while lag <= max_lag {
            if cmnd[lag] < p.yin_threshold {
                while lag < max_lag && cmnd[lag + 1] < cmnd[lag] {
                    lag += 1;
                }
                found = Some(lag);
                break;
            }
            lag += 1;
        }
        let lag = found?;

        let (before, at, after) = (cmnd[lag - 1], cmnd[lag], cmnd[lag + 1]);
        let curvature = before - 2.0 * at + after;
        let shift = if curvature.abs() > f32::EPSILON {
            (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let period = lag as f32 + shift;
        let frequency_hz = p.analysis_sample_rate as f32 / period;

        if frequency_hz < p.min_frequency_hz || frequency_hz > p.max_frequency_hz {
            return None;
        }
        let key = frequency_to_midi(frequency_hz)?;

        let loudness = ((level_db - p.silence_threshold_db) / -p.silence_threshold_db).clamp(0.0, 1.0);
        let velocity = (1.0 + loudness * 126.0).round() as u8;

        Some(FramePitch {
            key,
            frequency_hz,
            velocity,
        })
    }
}

impl Transcriber for PitchTracker {
    fn name(&self) -> &str {
        &self.label
    }

    fn predict(&self, audio_path: &Path) -> Result<Prediction, ModelError> {
        let decoded = decode_audio_file(audio_path)?;
        let samples = resample_mono(
            decoded.samples,
            decoded.sample_rate,
            self.params.analysis_sample_rate,
        )?;

        let notes = self.detect_notes(&samples);
        tracing::debug!(
            path = %audio_path.display(),
            notes = notes.len(),
            "Pitch tracking complete"
        );

        let midi = MidiDocument::new(
            self.params.ticks_per_quarter,
            self.params.tempo_bpm,
            self.params.program,
        );

        Ok(Prediction::from_notes(notes, midi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(frequency: f32, seconds: f32, amplitude: f32, sample_rate: u32) -> Vec<f32> {
        let n = (seconds * sample_rate as f32) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn tracker() -> PitchTracker {
        PitchTracker::new(PitchTrackerParams::default()).unwrap()
    }

    #[test]
    fn test_default_params_are_valid() {
        assert!(PitchTrackerParams::default().validate().is_ok());
    }

    #[test]
    fn test_a440_detected_as_key_69() {
        let samples = tone(440.0, 1.0, 0.3, 11025);
        let notes = tracker().detect_notes(&samples);

        assert_eq!(notes.len(), 1, "notes: {:?}", notes);
        assert_eq!(notes[0].pitch, 69);
        assert!((notes[0].frequency_hz - 440.0).abs() < 5.0);
        assert!(notes[0].duration_seconds() > 0.8);
    }

    #[test]
    fn test_silence_yields_no_notes() {
        let samples = vec![0.0f32; 11025];
        assert!(tracker().detect_notes(&samples).is_empty());
    }

    #[test]
    fn test_two_pitches_two_notes() {
        let mut samples = tone(261.63, 0.5, 0.3, 11025);
        samples.extend(tone(392.0, 0.5, 0.3, 11025));

        let keys: Vec<u8> = tracker().detect_notes(&samples).iter().map(|n| n.pitch).collect();
        assert_eq!(keys, vec![60, 67]);
    }

    #[test]
    fn test_short_blip_filtered() {
        let mut samples = vec![0.0f32; 5000];
        samples.extend(tone(440.0, 0.03, 0.3, 11025));
        samples.extend(vec![0.0f32; 5000]);

        assert!(tracker().detect_notes(&samples).is_empty());
    }

    #[test]
    fn test_louder_tone_higher_velocity() {
        let quiet = tracker().detect_notes(&tone(440.0, 0.5, 0.05, 11025));
        let loud = tracker().detect_notes(&tone(440.0, 0.5, 0.8, 11025));
        assert!(loud[0].velocity > quiet[0].velocity);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = PitchTrackerParams {
            frame_size: 128,
            ..PitchTrackerParams::default()
        };
        assert!(PitchTracker::new(params).is_err());

        let params = PitchTrackerParams {
            max_frequency_hz: 8000.0,
            ..PitchTrackerParams::default()
        };
        assert!(PitchTracker::new(params).is_err());
    }

    #[test]
    fn test_from_artifact_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "name = \"test-tracker\"\nversion = \"7\"\nhop_size = 128\n").unwrap();

        let tracker = PitchTracker::from_artifact(&path).unwrap();
        assert_eq!(tracker.name(), "test-tracker@7");
        assert_eq!(tracker.params().hop_size, 128);
        assert_eq!(tracker.params().frame_size, 1024);
    }

    #[test]
    fn test_from_artifact_rejects_bad_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "yin_threshold = 3.0\n").unwrap();

        let err = PitchTracker::from_artifact(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("yin_threshold"));
    }
}
