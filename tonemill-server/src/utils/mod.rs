//! Utility modules for tonemill-server

pub mod audio_decoder;

pub use audio_decoder::{decode_audio_file, resample_mono, DecodedAudio};
