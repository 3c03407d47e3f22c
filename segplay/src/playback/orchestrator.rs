//! Playback orchestrator
//!
//! Owns the caches, the (lazily started) persistent player and the playback
//! session. Every public method returns once playback has been *started*;
//! none of them return errors. When every tier fails the caller sees one
//! warning per orchestrator, delivered through the warning handler.

use crate::audio::{DurationProber, SegmentSlicer, WavSlicer};
use crate::cache::{remove_file_logged, ClipCache, DecodeCache};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::player::{ClipPlayer, SystemClipPlayer};
use crate::playback::state::{PlaybackSession, PlaybackStatus, SessionState};
use crate::playback::strategy::{
    default_strategies, ActivePlayback, PersistentSlot, PlaybackStrategy, SegmentRequest,
    StrategyContext, TEMP_CLIP_PREFIX,
};
use crate::playback::window::{clamp_to_total, normalize, SegmentOptions};
use crate::source::SourceRef;
use crate::tools::ToolResolver;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Containers the engine accepts for segment playback
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "m4a", "aac", "flac", "ogg", "opus", "wma", "webm", "mp4", "mkv", "mov", "avi",
    "aiff", "aif",
];

/// Receives the one user-visible warning
pub type WarningHandler = Arc<dyn Fn(&str) + Send + Sync>;

fn default_warning_handler() -> WarningHandler {
    Arc::new(|message: &str| warn!("{message}"))
}

/// True if `path` has an extension from [`SUPPORTED_EXTENSIONS`]
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

pub struct OrchestratorBuilder {
    config: EngineConfig,
    tools: Option<Arc<ToolResolver>>,
    clip_player: Option<Arc<dyn ClipPlayer>>,
    slicer: Option<Arc<dyn SegmentSlicer>>,
    strategies: Option<Vec<Box<dyn PlaybackStrategy>>>,
    warning_handler: Option<WarningHandler>,
}

impl OrchestratorBuilder {
    pub fn tools(mut self, tools: Arc<ToolResolver>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn clip_player(mut self, player: Arc<dyn ClipPlayer>) -> Self {
        self.clip_player = Some(player);
        self
    }

    pub fn slicer(mut self, slicer: Arc<dyn SegmentSlicer>) -> Self {
        self.slicer = Some(slicer);
        self
    }

    /// Replace the tier list
    pub fn strategies(mut self, strategies: Vec<Box<dyn PlaybackStrategy>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    pub fn warning_handler(mut self, handler: WarningHandler) -> Self {
        self.warning_handler = Some(handler);
        self
    }

    /// Fails only if the clip folder cannot be created
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        let tools = self.tools.unwrap_or_else(ToolResolver::shared);
        let clip_player = self.clip_player.unwrap_or_else(|| -> Arc<dyn ClipPlayer> {
            Arc::new(SystemClipPlayer::new(Arc::clone(&tools), config.window_mode))
        });

        let decode_cache = DecodeCache::new(
            config.decode_dir(),
            Arc::clone(&tools),
            config.decode_timeout,
        );
        let clip_cache = ClipCache::new(config.clip_dir(), config.clip_cache_capacity)?;
        let prober = DurationProber::new(Arc::clone(&tools), config.probe_timeout);

        info!(
            cache_dir = %config.cache_dir.display(),
            clip_capacity = clip_cache.capacity(),
            "Playback orchestrator ready"
        );

        Ok(Orchestrator {
            tools,
            decode_cache,
            clip_cache,
            persistent: PersistentSlot::new(),
            clip_player,
            slicer: self
                .slicer
                .unwrap_or_else(|| -> Arc<dyn SegmentSlicer> { Arc::new(WavSlicer::new()) }),
            prober,
            strategies: self.strategies.unwrap_or_else(default_strategies),
            session: PlaybackSession::new(),
            warned: false,
            warning_handler: self
                .warning_handler
                .unwrap_or_else(default_warning_handler),
            config,
        })
    }
}

pub struct Orchestrator {
    config: EngineConfig,
    tools: Arc<ToolResolver>,
    decode_cache: DecodeCache,
    clip_cache: ClipCache,
    persistent: PersistentSlot,
    clip_player: Arc<dyn ClipPlayer>,
    slicer: Arc<dyn SegmentSlicer>,
    prober: DurationProber,
    strategies: Vec<Box<dyn PlaybackStrategy>>,
    session: PlaybackSession,
    warned: bool,
    warning_handler: WarningHandler,
}

impl Orchestrator {
    pub fn builder(config: EngineConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            tools: None,
            clip_player: None,
            slicer: None,
            strategies: None,
            warning_handler: None,
        }
    }

    /// Orchestrator with the system tools and default tiers
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolResolver> {
        &self.tools
    }

    pub fn decode_cache(&self) -> &DecodeCache {
        &self.decode_cache
    }

    pub fn clip_cache(&self) -> &ClipCache {
        &self.clip_cache
    }

    /// Play a whole file from the start
    pub async fn play_file(&mut self, path: &Path) -> bool {
        self.stop().await;

        if !path.is_file() {
            self.warn_once(&format!("Audio file not found: {}", path.display()));
            return false;
        }

        match self.clip_player.play(path) {
            Ok(process) => {
                self.begin(PlaybackStatus::File, ActivePlayback::one_shot(process))
                    .await
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Whole-file playback failed");
                self.warn_once(&format!("Unable to play {}", path.display()));
                false
            }
        }
    }

    /// Play `[start, end]` of `path` through the first tier that succeeds
    ///
    /// `end = None` plays `min_duration` from `start`.
    pub async fn play_segment(
        &mut self,
        path: &Path,
        start: f64,
        end: Option<f64>,
        options: SegmentOptions,
    ) -> bool {
        self.stop().await;

        if !path.is_file() {
            self.warn_once(&format!("Audio file not found: {}", path.display()));
            return false;
        }
        if !is_supported_extension(path) {
            self.warn_once(&format!("Unsupported audio format: {}", path.display()));
            return false;
        }

        let source = match SourceRef::open(path) {
            Ok(source) => source,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read source");
                self.warn_once(&format!("Unable to read {}", path.display()));
                return false;
            }
        };

        let options = options.sanitized();
        let mut window = normalize(start, end, &options);
        if let Some(total) = self.prober.total_duration(&source.resolved).await {
            window = clamp_to_total(window, total, options.min_duration);
        }
        debug!(start = window.start, duration = window.duration, "Normalized segment");

        let request = SegmentRequest {
            source,
            window,
            pad_before: options.pad_before,
            pad_after: options.pad_after,
        };

        let mut ctx = StrategyContext {
            tools: &self.tools,
            config: &self.config,
            decode_cache: &self.decode_cache,
            clip_cache: &mut self.clip_cache,
            persistent: &mut self.persistent,
            clip_player: &*self.clip_player,
            slicer: &*self.slicer,
        };

        let mut served = None;
        for strategy in &self.strategies {
            let tier = strategy.tier();
            debug!(%tier, "Trying playback tier");
            if let Some(playback) = strategy.try_play(&mut ctx, &request).await {
                info!(%tier, file = %path.display(), "Segment playing");
                served = Some((tier, playback));
                break;
            }
        }

        match served {
            Some((tier, playback)) => self.begin(PlaybackStatus::Segment(tier), playback).await,
            None => {
                self.warn_once(
                    "Segment playback is unavailable. Install mpv or ffmpeg for reliable playback.",
                );
                false
            }
        }
    }

    /// Stop whatever is playing and delete the pending temp clip
    ///
    /// A no-op when idle.
    pub async fn stop(&mut self) {
        let ended = self.session.end();

        match ended.state {
            SessionState::Idle => {}
            SessionState::OneShot(mut process) => {
                process.terminate(self.config.terminate_wait).await;
            }
            SessionState::PersistentSession => {}
        }
        // Also covers a segment whose session was already marked finished
        self.persistent.pause_if_active().await;

        if let Some(clip) = ended.temp_clip {
            remove_file_logged(&clip, "temp clip");
        }
    }

    /// True while a one-shot process is alive or the persistent player is mid-segment
    pub fn is_playing(&mut self) -> bool {
        let playing = if let Some(process) = self.session.one_shot_mut() {
            process.is_alive()
        } else if matches!(self.session.state(), SessionState::PersistentSession) {
            self.persistent.is_active()
        } else {
            false
        };
        if !playing && !self.session.is_idle() {
            self.session.finish_naturally();
        }
        playing
    }

    /// Which tier (if any) is serving current playback
    pub fn status(&mut self) -> PlaybackStatus {
        self.is_playing();
        self.session.status()
    }

    /// Stop, release the persistent player, clear the clip cache
    pub async fn cleanup(&mut self) {
        self.stop().await;
        self.persistent.release().await;
        self.clip_cache.clear();
        info!("Playback orchestrator cleaned up");
    }

    /// Sweep decode cache, orphaned clips and stale temp clips older than `max_age_days`
    pub fn prune_caches(&self, max_age_days: u32) -> usize {
        let decoded = self.decode_cache.cleanup_old_caches(max_age_days);
        let clips = self.clip_cache.prune_orphans(max_age_days);
        let temps = crate::cache::sweep_older_than(self.config.temp_dir(), max_age_days, |p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TEMP_CLIP_PREFIX))
        });
        info!(decoded, clips, temps, "Pruned caches");
        decoded + clips + temps
    }

    async fn begin(&mut self, status: PlaybackStatus, playback: ActivePlayback) -> bool {
        match self.session.begin(status, playback) {
            Ok(()) => true,
            Err(rejected) => {
                // stop() always runs first, so this only trips on a logic error
                warn!("Session already active, discarding new playback");
                if let ActivePlayback::OneShot {
                    mut process,
                    temp_clip,
                } = rejected
                {
                    process.terminate(self.config.terminate_wait).await;
                    if let Some(clip) = temp_clip {
                        remove_file_logged(&clip, "temp clip");
                    }
                }
                false
            }
        }
    }

    fn warn_once(&mut self, message: &str) {
        if self.warned {
            debug!(message, "Suppressing repeated playback warning");
            return;
        }
        self.warned = true;
        (self.warning_handler)(message);
    }
}
