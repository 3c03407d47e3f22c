//! segplay engine configuration

use crate::error::Result;
use crate::player::WindowMode;
use segplay_common::config::TomlConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default clip cache capacity (entries)
pub const DEFAULT_CLIP_CACHE_CAPACITY: usize = 50;

/// Default minimum playable segment length (seconds)
pub const DEFAULT_MIN_DURATION_SECS: f64 = 0.4;

/// Playback engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the on-disk caches (`decoded/` and `clips/` live beneath)
    pub cache_dir: PathBuf,
    pub clip_cache_capacity: usize,
    /// Upper bound on one canonical PCM transcode
    pub decode_timeout: Duration,
    /// Upper bound on each temp-clip transcode attempt
    pub transcode_timeout: Duration,
    /// Upper bound on the metadata prober
    pub probe_timeout: Duration,
    /// How long to wait for the persistent player's control socket
    pub player_startup_timeout: Duration,
    /// A one-shot player still alive after this is considered started
    pub process_grace: Duration,
    /// Graceful terminate wait before force-kill
    pub terminate_wait: Duration,
    /// Pause after a file load before seeking in the persistent player
    pub load_settle: Duration,
    pub min_duration: f64,
    pub window_mode: WindowMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("segplay"),
            clip_cache_capacity: DEFAULT_CLIP_CACHE_CAPACITY,
            decode_timeout: Duration::from_secs(120),
            transcode_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            player_startup_timeout: Duration::from_millis(2000),
            process_grace: Duration::from_millis(300),
            terminate_wait: Duration::from_millis(1000),
            load_settle: Duration::from_millis(150),
            min_duration: DEFAULT_MIN_DURATION_SECS,
            window_mode: WindowMode::for_current_platform(),
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at `cache_dir`
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Overlay the values present in a TOML config onto the defaults
    pub fn from_toml(cache_dir: PathBuf, toml: &TomlConfig) -> Result<Self> {
        let mut config = Self::with_cache_dir(cache_dir);

        if let Some(capacity) = toml.clip_cache_capacity {
            config.clip_cache_capacity = capacity.max(1);
        }
        if let Some(secs) = toml.decode_timeout_secs {
            config.decode_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = toml.player_startup_timeout_ms {
            config.player_startup_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = toml.process_grace_ms {
            config.process_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = toml.terminate_wait_ms {
            config.terminate_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = toml.load_settle_ms {
            config.load_settle = Duration::from_millis(ms);
        }
        if let Some(secs) = toml.min_duration_secs {
            if secs.is_finite() && secs > 0.0 {
                config.min_duration = secs;
            }
        }
        if let Some(mode) = &toml.window_mode {
            config.window_mode = mode.parse()?;
        }

        Ok(config)
    }

    /// Folder holding canonical PCM working copies
    pub fn decode_dir(&self) -> PathBuf {
        self.cache_dir.join("decoded")
    }

    /// Folder holding sliced clips
    pub fn clip_dir(&self) -> PathBuf {
        self.cache_dir.join("clips")
    }

    /// Folder used for one-off temp clips
    pub fn temp_dir(&self) -> &Path {
        &self.cache_dir
    }
}
