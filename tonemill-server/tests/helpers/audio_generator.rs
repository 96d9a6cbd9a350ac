//! Audio Test Fixture Generator
//!
//! Utilities for generating test recordings in memory or on disk

use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Configuration for generated audio
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sine frequency; `None` writes digital silence
    pub frequency_hz: Option<f32>,
    /// Peak amplitude, 0.0-1.0
    pub amplitude: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 2.0,
            sample_rate: 44100,
            channels: 1,
            frequency_hz: Some(440.0),
            amplitude: 0.5,
        }
    }
}

impl AudioConfig {
    pub fn tone(frequency_hz: f32, duration_seconds: f64) -> Self {
        Self {
            frequency_hz: Some(frequency_hz),
            duration_seconds,
            ..Self::default()
        }
    }

    pub fn silence(duration_seconds: f64) -> Self {
        Self {
            frequency_hz: None,
            duration_seconds,
            ..Self::default()
        }
    }
}

fn write_samples<W>(writer: &mut hound::WavWriter<W>, config: &AudioConfig) -> anyhow::Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let total_samples = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_samples {
        let sample = match config.frequency_hz {
            Some(freq) => {
                let t = i as f32 / config.sample_rate as f32;
                (config.amplitude * (2.0 * std::f32::consts::PI * freq * t).sin() * i16::MAX as f32)
                    as i16
            }
            None => 0,
        };
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }
    Ok(())
}

fn spec(config: &AudioConfig) -> hound::WavSpec {
    hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Generate a 16-bit PCM WAV file in memory
pub fn wav_bytes(config: &AudioConfig) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec(config)).unwrap();
        write_samples(&mut writer, config).unwrap();
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Generate a test WAV file on disk
pub fn generate_test_wav(path: &Path, config: &AudioConfig) -> anyhow::Result<PathBuf> {
    let mut writer = hound::WavWriter::create(path, spec(config))?;
    write_samples(&mut writer, config)?;
    writer.finalize()?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wav_bytes_has_riff_header() {
        let bytes = wav_bytes(&AudioConfig::tone(440.0, 0.1));
        assert_eq!(&bytes[..4], b"RIFF");
        // 44-byte header + 4410 16-bit samples
        assert_eq!(bytes.len(), 44 + 4410 * 2);
    }

    #[test]
    fn test_generate_wav_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let wav_path = temp_dir.path().join("test.wav");

        generate_test_wav(&wav_path, &AudioConfig::silence(0.5)).unwrap();

        let reader = hound::WavReader::open(&wav_path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44100);
        assert!(reader.into_samples::<i16>().all(|s| s.unwrap() == 0));
    }
}
