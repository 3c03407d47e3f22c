//! Error types for segplay
//!
//! Defines the engine error taxonomy using thiserror. Strategy tiers catch
//! these internally and fall through to the next tier; none of them escape
//! the orchestrator's public playback methods.
//!
//! Cache misses are not errors: lookups return `Option::None`.

use crate::tools::Tool;
use std::process::ExitStatus;
use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum Error {
    /// Required external binary absent
    #[error("Required tool not found: {0}")]
    ToolMissing(Tool),

    /// Persistent player control socket never appeared
    #[error("Player control socket did not appear within {waited_ms} ms")]
    StartupTimeout { waited_ms: u64 },

    /// One-shot process died immediately
    #[error("Process exited early ({status}): {stderr}")]
    ProcessExitedEarly { status: ExitStatus, stderr: String },

    /// Degenerate or empty slice request
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Disk or permission errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Canonical PCM container errors
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Control socket errors
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Duration probe failed
    #[error("Probe error: {0}")]
    Probe(String),

    /// External transcoder failed or timed out
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] segplay_common::Error),
}

/// Convenience Result type using segplay Error
pub type Result<T> = std::result::Result<T, Error>;
