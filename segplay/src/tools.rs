//! External tool resolution
//!
//! Locates the media binaries the engine shells out to and memoizes the
//! lookup. Each orchestrator holds an `Arc<ToolResolver>`; a process-wide
//! instance is available via [`ToolResolver::shared`]. Overrides and
//! `reset()` exist so callers (and tests) can pin or hide binaries.

use crate::error::{Error, Result};
use segplay_common::config::ToolPathsConfig;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

/// External binaries the engine knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// General-purpose transcoder (ffmpeg)
    Transcoder,
    /// Metadata prober (ffprobe)
    Prober,
    /// One-shot player with native seek/duration flags (ffplay)
    SeekPlayer,
    /// Long-lived player with a control socket (mpv)
    PersistentPlayer,
    /// OS-native single-file player
    NativePlayer,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Transcoder,
        Tool::Prober,
        Tool::SeekPlayer,
        Tool::PersistentPlayer,
        Tool::NativePlayer,
    ];

    /// Binary names searched on `PATH`, in preference order
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            Tool::Transcoder => &["ffmpeg"],
            Tool::Prober => &["ffprobe"],
            Tool::SeekPlayer => &["ffplay"],
            Tool::PersistentPlayer => &["mpv"],
            Tool::NativePlayer => native_player_candidates(),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Transcoder => write!(f, "transcoder"),
            Tool::Prober => write!(f, "prober"),
            Tool::SeekPlayer => write!(f, "seek-player"),
            Tool::PersistentPlayer => write!(f, "persistent-player"),
            Tool::NativePlayer => write!(f, "native-player"),
        }
    }
}

#[cfg(target_os = "macos")]
fn native_player_candidates() -> &'static [&'static str] {
    &["afplay"]
}

#[cfg(target_os = "windows")]
fn native_player_candidates() -> &'static [&'static str] {
    &["powershell"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn native_player_candidates() -> &'static [&'static str] {
    &["paplay", "aplay"]
}

#[derive(Debug, Clone)]
enum Override {
    Path(PathBuf),
    Disabled,
}

/// Memoized binary lookup with override hooks
#[derive(Debug, Default)]
pub struct ToolResolver {
    resolved: Mutex<HashMap<Tool, Option<PathBuf>>>,
    overrides: Mutex<HashMap<Tool, Override>>,
}

impl ToolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver seeded with the `[tools]` table of the config file
    pub fn from_config(config: &ToolPathsConfig) -> Self {
        let resolver = Self::new();
        let pairs = [
            (Tool::Transcoder, &config.transcoder),
            (Tool::Prober, &config.prober),
            (Tool::SeekPlayer, &config.seek_player),
            (Tool::PersistentPlayer, &config.persistent_player),
            (Tool::NativePlayer, &config.native_player),
        ];
        for (tool, path) in pairs {
            if let Some(path) = path {
                resolver.set_override(tool, path);
            }
        }
        resolver
    }

    /// Process-wide resolver
    pub fn shared() -> Arc<ToolResolver> {
        static SHARED: OnceLock<Arc<ToolResolver>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(ToolResolver::new())))
    }

    /// Pin a tool to an explicit binary
    pub fn set_override(&self, tool: Tool, path: impl Into<PathBuf>) {
        self.lock_overrides().insert(tool, Override::Path(path.into()));
        self.lock_resolved().remove(&tool);
    }

    /// Treat a tool as absent regardless of `PATH`
    pub fn disable(&self, tool: Tool) {
        self.lock_overrides().insert(tool, Override::Disabled);
        self.lock_resolved().remove(&tool);
    }

    /// Drop memoized lookups and all overrides
    pub fn reset(&self) {
        self.lock_overrides().clear();
        self.lock_resolved().clear();
    }

    /// Locate a tool, memoizing the result
    pub fn resolve(&self, tool: Tool) -> Option<PathBuf> {
        if let Some(ov) = self.lock_overrides().get(&tool).cloned() {
            return match ov {
                Override::Path(path) if path.is_file() => Some(path),
                Override::Path(path) => {
                    debug!(%tool, path = %path.display(), "Override path does not exist");
                    None
                }
                Override::Disabled => None,
            };
        }

        if let Some(cached) = self.lock_resolved().get(&tool) {
            return cached.clone();
        }

        let found = tool
            .candidates()
            .iter()
            .find_map(|name| search_path(name));
        debug!(%tool, found = ?found, "Resolved tool");
        self.lock_resolved().insert(tool, found.clone());
        found
    }

    /// Locate a tool or fail with `ToolMissing`
    pub fn require(&self, tool: Tool) -> Result<PathBuf> {
        self.resolve(tool).ok_or(Error::ToolMissing(tool))
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.resolve(tool).is_some()
    }

    fn lock_resolved(&self) -> std::sync::MutexGuard<'_, HashMap<Tool, Option<PathBuf>>> {
        self.resolved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_overrides(&self) -> std::sync::MutexGuard<'_, HashMap<Tool, Override>> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    search_in(&path_var, name)
}

fn search_in(path_var: &std::ffi::OsStr, name: &str) -> Option<PathBuf> {
    std::env::split_paths(path_var).find_map(|dir| {
        let candidate = dir.join(executable_name(name));
        is_executable(&candidate).then_some(candidate)
    })
}

#[cfg(windows)]
fn executable_name(name: &str) -> String {
    format!("{name}.exe")
}

#[cfg(not(windows))]
fn executable_name(name: &str) -> String {
    name.to_string()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_tool_is_missing() {
        let resolver = ToolResolver::new();
        resolver.disable(Tool::PersistentPlayer);
        assert!(resolver.resolve(Tool::PersistentPlayer).is_none());
        assert!(matches!(
            resolver.require(Tool::PersistentPlayer),
            Err(Error::ToolMissing(Tool::PersistentPlayer))
        ));
    }

    #[test]
    fn test_override_to_existing_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let resolver = ToolResolver::new();
        resolver.set_override(Tool::Transcoder, tmp.path());
        assert_eq!(resolver.resolve(Tool::Transcoder), Some(tmp.path().to_path_buf()));
    }

    #[test]
    fn test_override_to_missing_file_is_absent() {
        let resolver = ToolResolver::new();
        resolver.set_override(Tool::Transcoder, "/definitely/not/here/ffmpeg");
        assert!(!resolver.is_available(Tool::Transcoder));
    }

    #[test]
    fn test_reset_clears_overrides() {
        let resolver = ToolResolver::new();
        resolver.disable(Tool::Prober);
        assert!(resolver.resolve(Tool::Prober).is_none());
        resolver.reset();
        // Falls back to PATH lookup; result depends on host, but must not panic
        let _ = resolver.resolve(Tool::Prober);
    }

    #[test]
    fn test_from_config_applies_overrides() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let config = ToolPathsConfig {
            seek_player: Some(tmp.path().to_path_buf()),
            ..Default::default()
        };
        let resolver = ToolResolver::from_config(&config);
        assert_eq!(resolver.resolve(Tool::SeekPlayer), Some(tmp.path().to_path_buf()));
    }

    #[cfg(unix)]
    #[test]
    fn test_search_skips_non_executable_entries() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("mpv"), "not runnable").unwrap();
        let runnable = second.path().join("mpv");
        std::fs::write(&runnable, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&runnable, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(search_in(&path_var, "mpv"), Some(runnable));
        assert_eq!(search_in(&path_var, "ffplay"), None);
    }

    #[test]
    fn test_shared_is_same_instance() {
        assert!(Arc::ptr_eq(&ToolResolver::shared(), &ToolResolver::shared()));
    }
}
