//! Test helper modules for segplay integration tests
//!
//! - `audio_generator`: deterministic canonical-format WAV fixtures
//! - `fake_tools`: shell-script stand-ins for the external media tools and
//!   in-process spies for the player and slicer seams

#![allow(dead_code)]

pub mod audio_generator;
pub mod fake_tools;

pub use audio_generator::{generate_tone_wav, CANONICAL_RATE};
pub use fake_tools::{
    fake_seek_player, fake_transcoder, script, CountingSlicer, RecordingClipPlayer,
};
