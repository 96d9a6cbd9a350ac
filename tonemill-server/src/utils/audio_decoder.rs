//! Audio Decoding Utilities
//!
//! **Purpose:** Decode an uploaded recording to mono f32 PCM for pitch analysis
//!
//! Uses symphonia for format-agnostic decoding (WAV, MP3, FLAC, AAC/M4A, OGG)
//! and rubato for resampling to the analysis rate. Nothing is written back to
//! disk; the upload is never transcoded.

use anyhow::{anyhow, Context};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use crate::model::ModelError;

/// Lowest source sample rate accepted (Hz)
pub const MIN_SOURCE_RATE: u32 = 4_000;
/// Highest source sample rate accepted (Hz)
pub const MAX_SOURCE_RATE: u32 = 192_000;
/// Longest recording decoded, in seconds
pub const MAX_DURATION_SECONDS: u32 = 30 * 60;

/// Input frames fed to the resampler per call
const RESAMPLE_CHUNK: usize = 4096;

/// Decoded audio result
#[derive(Debug)]
pub struct DecodedAudio {
    /// Mono audio samples (f32, range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Original channel count
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode audio file to mono f32 PCM samples
///
/// **Algorithm:**
/// 1. Open file and probe format using symphonia (extension as hint)
/// 2. Find default audio track and create its decoder
/// 3. Decode all packets, averaging channels to mono
///
/// Sample rates outside [`MIN_SOURCE_RATE`]..=[`MAX_SOURCE_RATE`] are
/// refused before any sample is read. Recordings longer than
/// [`MAX_DURATION_SECONDS`], or too long to hold in memory, fail with
/// [`ModelError::OutOfMemory`] instead of aborting the process.
pub fn decode_audio_file(file_path: &Path) -> Result<DecodedAudio, ModelError> {
    decode_with_limit(file_path, MAX_DURATION_SECONDS)
}

/// [`decode_audio_file`] with an explicit duration cap
pub fn decode_with_limit(file_path: &Path, max_seconds: u32) -> Result<DecodedAudio, ModelError> {
    tracing::debug!(path = %file_path.display(), "Decoding audio file");

    let file = std::fs::File::open(file_path)
        .with_context(|| format!("Failed to open audio file: {}", file_path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = file_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", file_path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate unknown")?;
    check_source_rate(sample_rate)?;
    let max_frames = max_frames(sample_rate, max_seconds);
    let channel_count = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1);

    tracing::debug!(
        path = %file_path.display(),
        sample_rate = sample_rate,
        channels = channel_count,
        "Audio file info"
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("Failed to create decoder for: {}", file_path.display()))?;

    let mut samples: Vec<f32> = Vec::new();
    // The header's frame count is untrusted
    if let Some(frames) = track.codec_params.n_frames {
        let frames = usize::try_from(frames).unwrap_or(usize::MAX).min(max_frames);
        reserve(&mut samples, frames)?;
    }

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(anyhow!("Error reading packet: {}", e).into());
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if samples.len().saturating_add(decoded.frames()) > max_frames {
                    return Err(too_long(max_seconds));
                }
                append_mono(&decoded, &mut samples)?;
            }
            // Corrupt frames are skipped, as symphonia recommends
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(path = %file_path.display(), "Skipping undecodable packet: {}", e);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to decode packet in: {}", file_path.display()))
                    .into());
            }
        }
    }

    let decoded = DecodedAudio {
        samples,
        sample_rate,
        channels: channel_count,
    };

    tracing::debug!(
        path = %file_path.display(),
        total_samples = decoded.samples.len(),
        duration_seconds = format!("{:.2}", decoded.duration_seconds()),
        "Audio decoding complete"
    );

    Ok(decoded)
}

fn check_source_rate(sample_rate: u32) -> Result<(), ModelError> {
    if !(MIN_SOURCE_RATE..=MAX_SOURCE_RATE).contains(&sample_rate) {
        return Err(anyhow!(
            "Unsupported sample rate {} Hz (accepted: {}-{} Hz)",
            sample_rate,
            MIN_SOURCE_RATE,
            MAX_SOURCE_RATE
        )
        .into());
    }
    Ok(())
}

fn max_frames(sample_rate: u32, seconds: u32) -> usize {
    let frames = u64::from(sample_rate).saturating_mul(u64::from(seconds));
    usize::try_from(frames).unwrap_or(usize::MAX)
}

fn too_long(max_seconds: u32) -> ModelError {
    ModelError::OutOfMemory(format!(
        "recording is longer than the {} second limit",
        max_seconds
    ))
}

fn reserve(samples: &mut Vec<f32>, additional: usize) -> Result<(), ModelError> {
    samples.try_reserve(additional).map_err(|e| {
        ModelError::OutOfMemory(format!(
            "cannot hold {} more samples after {}: {}",
            additional,
            samples.len(),
            e
        ))
    })
}

/// Average all channels of one decoded packet into `out`
fn append_mono(decoded: &AudioBufferRef, out: &mut Vec<f32>) -> Result<(), ModelError> {
    match decoded {
        AudioBufferRef::U8(buf) => mix_into(buf, out),
        AudioBufferRef::U16(buf) => mix_into(buf, out),
        AudioBufferRef::U24(buf) => mix_into(buf, out),
        AudioBufferRef::U32(buf) => mix_into(buf, out),
        AudioBufferRef::S8(buf) => mix_into(buf, out),
        AudioBufferRef::S16(buf) => mix_into(buf, out),
        AudioBufferRef::S24(buf) => mix_into(buf, out),
        AudioBufferRef::S32(buf) => mix_into(buf, out),
        AudioBufferRef::F32(buf) => mix_into(buf, out),
        AudioBufferRef::F64(buf) => mix_into(buf, out),
    }
}

fn mix_into<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>) -> Result<(), ModelError>
where
    S: Sample,
    f32: FromSample<S>,
{
    let num_channels = buf.spec().channels.count().max(1);
    let num_frames = buf.frames();
    reserve(out, num_frames)?;

    for frame_idx in 0..num_frames {
        let mut sum = 0.0f32;
        for ch in 0..num_channels {
            sum += f32::from_sample(buf.chan(ch)[frame_idx]);
        }
        out.push(sum / num_channels as f32);
    }

    Ok(())
}

/// Output length of resampling `input_len` frames, bounded by the duration cap
fn resampled_len(input_len: usize, source_rate: u32, target_rate: u32) -> Result<usize, ModelError> {
    check_source_rate(source_rate)?;
    let expected = (input_len as u64)
        .checked_mul(u64::from(target_rate))
        .map(|n| n / u64::from(source_rate))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| too_long(MAX_DURATION_SECONDS))?;
    if expected > max_frames(target_rate, MAX_DURATION_SECONDS) {
        return Err(too_long(MAX_DURATION_SECONDS));
    }
    Ok(expected)
}

/// Resample mono PCM to `target_rate`
///
/// Uses sinc interpolation (BlackmanHarris2 window, 128 taps), fed in fixed
/// chunks into an output buffer sized up front. The filter delay is trimmed
/// so output sample `i` lines up with input time `i / target_rate`.
pub fn resample_mono(samples: Vec<f32>, source_rate: u32, target_rate: u32) -> Result<Vec<f32>, ModelError> {
    if samples.is_empty() || source_rate == target_rate {
        return Ok(samples);
    }
    let expected = resampled_len(samples.len(), source_rate, target_rate)?;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let wanted = expected + delay;
    let mut output: Vec<f32> = Vec::new();
    reserve(&mut output, wanted + 2 * resampler.output_frames_max())?;

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let next = pos + resampler.input_frames_next();
        let chunk = resampler
            .process(&[&samples[pos..next]], None)
            .context("Resampling failed")?;
        output.extend_from_slice(&chunk[0]);
        pos = next;
    }
    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&tail[..]), None)
            .context("Resampling failed")?;
        output.extend_from_slice(&chunk[0]);
    }
    // Flush the filter tail with silence
    while output.len() < wanted {
        let chunk = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .context("Resampling failed")?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);

    tracing::debug!(
        "Resampled {} frames ({} Hz) → {} frames ({} Hz)",
        samples.len(),
        source_rate,
        output.len(),
        target_rate
    );

    Ok(output)
}
