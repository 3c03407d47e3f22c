//! Whole-file playback
//!
//! Plays a file from start to end with no seeking: the preferred external
//! player when present, otherwise the OS-native player.

use crate::error::{Error, Result};
use crate::player::process::OneShotProcess;
use crate::player::WindowMode;
use crate::tools::{Tool, ToolResolver};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Launches a one-shot process that plays one file
pub trait ClipPlayer: Send + Sync {
    fn play(&self, path: &Path) -> Result<OneShotProcess>;
}

/// Default whole-file player backed by resolved system tools
pub struct SystemClipPlayer {
    tools: Arc<ToolResolver>,
    window_mode: WindowMode,
}

impl SystemClipPlayer {
    pub fn new(tools: Arc<ToolResolver>, window_mode: WindowMode) -> Self {
        Self { tools, window_mode }
    }
}

impl ClipPlayer for SystemClipPlayer {
    fn play(&self, path: &Path) -> Result<OneShotProcess> {
        if let Some(player) = self.tools.resolve(Tool::SeekPlayer) {
            let mut args: Vec<OsString> = self
                .window_mode
                .seek_player_args()
                .into_iter()
                .map(OsString::from)
                .collect();
            args.extend(
                ["-autoexit", "-loglevel", "error", "-nostats"]
                    .into_iter()
                    .map(OsString::from),
            );
            args.push(path.as_os_str().to_os_string());
            return OneShotProcess::spawn(&player, args, "clip");
        }

        let native = self
            .tools
            .resolve(Tool::NativePlayer)
            .ok_or(Error::ToolMissing(Tool::NativePlayer))?;
        debug!(player = %native.display(), "Falling back to native player");
        OneShotProcess::spawn(&native, native_player_args(path), "native")
    }
}

#[cfg(target_os = "windows")]
fn native_player_args(path: &Path) -> Vec<OsString> {
    let escaped = path.to_string_lossy().replace('\'', "''");
    vec![
        OsString::from("-NoProfile"),
        OsString::from("-NonInteractive"),
        OsString::from("-Command"),
        OsString::from(format!(
            "(New-Object Media.SoundPlayer '{escaped}').PlaySync()"
        )),
    ]
}

#[cfg(not(target_os = "windows"))]
fn native_player_args(path: &Path) -> Vec<OsString> {
    vec![path.as_os_str().to_os_string()]
}
