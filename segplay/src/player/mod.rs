//! External player supervision
//!
//! **Components:**
//! - `ipc`: fire-and-forget control socket client
//! - `deferred`: cancellable deferred-stop task
//! - `controller`: long-lived persistent player driven over IPC
//! - `process`: one-shot player processes and their termination
//! - `clip_player`: whole-file playback with OS-native fallback

pub mod clip_player;
pub mod controller;
pub mod deferred;
pub mod ipc;
pub mod process;

pub use clip_player::{ClipPlayer, SystemClipPlayer};
pub use controller::PersistentPlayer;
pub use deferred::DeferredStop;
pub use ipc::{IpcClient, IpcCommand};
pub use process::OneShotProcess;

use std::fmt;
use std::str::FromStr;

/// How external players present themselves on screen
///
/// Some desktop platforms refuse a fully headless player window, so those
/// get a minimal visible window instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Hidden,
    SmallVisible,
}

impl WindowMode {
    pub fn for_current_platform() -> Self {
        if cfg!(target_os = "macos") {
            WindowMode::SmallVisible
        } else {
            WindowMode::Hidden
        }
    }

    /// Window flags for the persistent player
    pub fn persistent_player_args(&self) -> Vec<String> {
        match self {
            WindowMode::Hidden => vec!["--force-window=no".into(), "--no-video".into()],
            WindowMode::SmallVisible => vec![
                "--force-window=yes".into(),
                "--geometry=64x64+0+0".into(),
                "--no-border".into(),
            ],
        }
    }

    /// Window flags for the one-shot seek player
    pub fn seek_player_args(&self) -> Vec<String> {
        match self {
            WindowMode::Hidden => vec!["-nodisp".into()],
            WindowMode::SmallVisible => vec![
                "-x".into(),
                "64".into(),
                "-y".into(),
                "64".into(),
                "-left".into(),
                "0".into(),
                "-top".into(),
                "0".into(),
            ],
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMode::Hidden => write!(f, "hidden"),
            WindowMode::SmallVisible => write!(f, "small-visible"),
        }
    }
}

impl FromStr for WindowMode {
    type Err = segplay_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hidden" | "headless" => Ok(WindowMode::Hidden),
            "small-visible" | "small" | "visible" => Ok(WindowMode::SmallVisible),
            other => Err(segplay_common::Error::InvalidInput(format!(
                "unknown window mode '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_mode_parse_round_trip() {
        for mode in [WindowMode::Hidden, WindowMode::SmallVisible] {
            assert_eq!(mode.to_string().parse::<WindowMode>().unwrap(), mode);
        }
        assert!("huge".parse::<WindowMode>().is_err());
    }

    #[test]
    fn test_hidden_seek_player_has_no_display() {
        assert_eq!(WindowMode::Hidden.seek_player_args(), vec!["-nodisp".to_string()]);
        assert!(!WindowMode::SmallVisible
            .seek_player_args()
            .contains(&"-nodisp".to_string()));
    }
}
