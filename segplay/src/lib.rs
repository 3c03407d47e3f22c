//! # segplay
//!
//! Low-latency playback of short time windows ("segments") of audio files.
//!
//! **Purpose:** Play `[start, end]` of a recording again and again with as
//! little delay as the host's tooling allows, degrading gracefully when the
//! preferred external player or transcoder is missing.
//!
//! **Architecture:** A [`playback::Orchestrator`] walks an ordered list of
//! playback strategies: persistent player over IPC, clip cache, decode cache
//! plus raw slice, direct seek in a one-shot player, transcoded temp clip.
//! The first tier that starts playback wins.

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod playback;
pub mod player;
pub mod source;
pub mod tools;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::{Orchestrator, PlaybackStatus, SegmentOptions, Tier};
pub use tools::{Tool, ToolResolver};
