//! Playback session state
//!
//! Exactly one of idle, persistent-player session or one-shot process holds
//! at any time. The state only changes through [`PlaybackSession::begin`]
//! and [`PlaybackSession::end`].

use crate::player::OneShotProcess;
use crate::playback::strategy::{ActivePlayback, Tier};
use std::fmt;
use std::path::PathBuf;

/// What is currently playing
#[derive(Debug)]
pub enum SessionState {
    Idle,
    PersistentSession,
    OneShot(OneShotProcess),
}

/// Caller-facing summary of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    /// Whole-file playback
    File,
    /// Segment playback served by a strategy tier
    Segment(Tier),
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::File => write!(f, "playing file"),
            PlaybackStatus::Segment(tier) => write!(f, "playing segment via {tier}"),
        }
    }
}

/// Everything `stop()` has to tear down
#[derive(Debug)]
pub struct EndedSession {
    pub state: SessionState,
    pub temp_clip: Option<PathBuf>,
}

#[derive(Debug)]
pub struct PlaybackSession {
    state: SessionState,
    status: PlaybackStatus,
    temp_clip: Option<PathBuf>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            status: PlaybackStatus::Idle,
            temp_clip: None,
        }
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SessionState::Idle)
    }

    /// Idle → PersistentSession | OneShot
    ///
    /// Refused (and the playback handed back) unless the session is idle.
    pub fn begin(
        &mut self,
        status: PlaybackStatus,
        playback: ActivePlayback,
    ) -> Result<(), ActivePlayback> {
        if !self.is_idle() {
            return Err(playback);
        }

        match playback {
            ActivePlayback::Persistent => {
                self.state = SessionState::PersistentSession;
            }
            ActivePlayback::OneShot { process, temp_clip } => {
                self.state = SessionState::OneShot(process);
                self.temp_clip = temp_clip;
            }
        }
        self.status = status;
        Ok(())
    }

    /// Any → Idle, handing back what needs tearing down
    pub fn end(&mut self) -> EndedSession {
        self.status = PlaybackStatus::Idle;
        EndedSession {
            state: std::mem::replace(&mut self.state, SessionState::Idle),
            temp_clip: self.temp_clip.take(),
        }
    }

    /// Mutable access to the one-shot process, if that is what is playing
    pub fn one_shot_mut(&mut self) -> Option<&mut OneShotProcess> {
        match &mut self.state {
            SessionState::OneShot(process) => Some(process),
            _ => None,
        }
    }

    /// Playback ended on its own; keep the temp clip for the next stop
    pub fn finish_naturally(&mut self) {
        self.status = PlaybackStatus::Idle;
        self.state = SessionState::Idle;
    }
}
