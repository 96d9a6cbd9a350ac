//! # Tonemill Common Library
//!
//! Shared code for the Tonemill audio-to-MIDI service:
//! - Configuration loading and resolution
//! - Common error type

pub mod config;
pub mod error;

pub use config::{ConfigOverrides, ServiceConfig};
pub use error::{Error, Result};
