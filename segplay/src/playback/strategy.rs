//! Playback strategy tiers
//!
//! Each tier tries one way of getting a segment audible and returns the
//! resulting playback handle, or `None` to let the next tier try. Tiers log
//! their own failures and never propagate them.
//!
//! Default order:
//! 1. Persistent player (IPC seek into the loaded file)
//! 2. Clip cache hit
//! 3. Decode cache + raw slice
//! 4. Direct seek in a fresh one-shot player (small-window mode only)
//! 5. Transcoded temp clip

use crate::audio::SegmentSlicer;
use crate::cache::{remove_file_logged, ClipCache, ClipKey, DecodeCache};
use crate::config::EngineConfig;
use crate::player::{ClipPlayer, OneShotProcess, PersistentPlayer, WindowMode};
use crate::playback::window::SegmentWindow;
use crate::source::SourceRef;
use crate::tools::{Tool, ToolResolver};
use async_trait::async_trait;
use segplay_common::time::secs_to_millis;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name prefix of transcoded temp clips
pub const TEMP_CLIP_PREFIX: &str = "segplay-clip-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    PersistentPlayer,
    ClipCache,
    DecodeSlice,
    DirectSeek,
    TempClip,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::PersistentPlayer => write!(f, "persistent player"),
            Tier::ClipCache => write!(f, "clip cache"),
            Tier::DecodeSlice => write!(f, "decode + slice"),
            Tier::DirectSeek => write!(f, "direct seek"),
            Tier::TempClip => write!(f, "temp clip"),
        }
    }
}

/// A normalized segment request
#[derive(Debug, Clone)]
pub struct SegmentRequest {
    pub source: SourceRef,
    pub window: SegmentWindow,
    pub pad_before: f64,
    pub pad_after: f64,
}

impl SegmentRequest {
    pub fn clip_key(&self) -> ClipKey {
        ClipKey::new(
            self.source.fingerprint.clone(),
            secs_to_millis(self.window.start),
            secs_to_millis(self.window.duration),
            secs_to_millis(self.pad_before),
            secs_to_millis(self.pad_after),
        )
    }
}

/// Handle for whatever a tier started
#[derive(Debug)]
pub enum ActivePlayback {
    /// The persistent player is playing; its own timer stops it
    Persistent,
    /// A one-shot process, plus a temp file to delete on the next stop
    OneShot {
        process: OneShotProcess,
        temp_clip: Option<PathBuf>,
    },
}

impl ActivePlayback {
    pub fn one_shot(process: OneShotProcess) -> Self {
        ActivePlayback::OneShot {
            process,
            temp_clip: None,
        }
    }
}

/// Lazily probed, lazily started persistent player
///
/// The binary lookup happens once. A failed start disables the slot for the
/// rest of the owner's life so later requests go straight to other tiers.
#[derive(Default)]
pub struct PersistentSlot {
    binary: Option<Option<PathBuf>>,
    player: Option<PersistentPlayer>,
    disabled: bool,
}

impl PersistentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Started player, starting it on first use
    pub async fn acquire(
        &mut self,
        tools: &ToolResolver,
        config: &EngineConfig,
    ) -> Option<&mut PersistentPlayer> {
        if self.disabled {
            return None;
        }

        let binary = self
            .binary
            .get_or_insert_with(|| tools.resolve(Tool::PersistentPlayer))
            .clone()?;

        let player = self
            .player
            .get_or_insert_with(|| PersistentPlayer::new(binary, config));
        let started = player.start().await;
        if let Err(e) = started {
            warn!(error = %e, "Persistent player unavailable, disabling for this session");
            self.disabled = true;
            if let Some(mut player) = self.player.take() {
                player.stop().await;
            }
            return None;
        }
        self.player.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.player.as_ref().is_some_and(|p| p.is_active())
    }

    /// Pause the player if a segment is still playing
    pub async fn pause_if_active(&mut self) {
        if let Some(player) = self.player.as_mut() {
            if player.is_active() {
                if let Err(e) = player.pause().await {
                    debug!(error = %e, "Pause failed");
                }
            }
        }
    }

    /// Stop and drop the player process
    pub async fn release(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.stop().await;
        }
    }
}

/// Everything a tier may use
pub struct StrategyContext<'a> {
    pub tools: &'a ToolResolver,
    pub config: &'a EngineConfig,
    pub decode_cache: &'a DecodeCache,
    pub clip_cache: &'a mut ClipCache,
    pub persistent: &'a mut PersistentSlot,
    pub clip_player: &'a dyn ClipPlayer,
    pub slicer: &'a dyn SegmentSlicer,
}

#[async_trait]
pub trait PlaybackStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    async fn try_play(
        &self,
        ctx: &mut StrategyContext<'_>,
        request: &SegmentRequest,
    ) -> Option<ActivePlayback>;
}

/// The five built-in tiers in priority order
pub fn default_strategies() -> Vec<Box<dyn PlaybackStrategy>> {
    vec![
        Box::new(PersistentPlayerStrategy),
        Box::new(ClipCacheStrategy),
        Box::new(DecodeSliceStrategy),
        Box::new(DirectSeekStrategy),
        Box::new(TempClipStrategy),
    ]
}

fn play_clip(ctx: &StrategyContext<'_>, clip: &Path, tier: Tier) -> Option<OneShotProcess> {
    match ctx.clip_player.play(clip) {
        Ok(process) => Some(process),
        Err(e) => {
            warn!(%tier, clip = %clip.display(), error = %e, "Could not start clip playback");
            None
        }
    }
}

pub struct PersistentPlayerStrategy;

#[async_trait]
impl PlaybackStrategy for PersistentPlayerStrategy {
    fn tier(&self) -> Tier {
        Tier::PersistentPlayer
    }

    async fn try_play(
        &self,
        ctx: &mut StrategyContext<'_>,
        request: &SegmentRequest,
    ) -> Option<ActivePlayback> {
        let player = ctx.persistent.acquire(ctx.tools, ctx.config).await?;
        let sent = player
            .play_segment(
                &request.source.resolved,
                request.window.start,
                request.window.duration,
            )
            .await;
        match sent {
            Ok(()) => Some(ActivePlayback::Persistent),
            Err(e) => {
                warn!(error = %e, "Persistent player command failed, restarting on next use");
                ctx.persistent.release().await;
                None
            }
        }
    }
}

pub struct ClipCacheStrategy;

#[async_trait]
impl PlaybackStrategy for ClipCacheStrategy {
    fn tier(&self) -> Tier {
        Tier::ClipCache
    }

    async fn try_play(
        &self,
        ctx: &mut StrategyContext<'_>,
        request: &SegmentRequest,
    ) -> Option<ActivePlayback> {
        let clip = ctx.clip_cache.get(&request.clip_key())?;
        debug!(clip = %clip.display(), "Clip cache hit");
        play_clip(ctx, &clip, self.tier()).map(ActivePlayback::one_shot)
    }
}

pub struct DecodeSliceStrategy;

#[async_trait]
impl PlaybackStrategy for DecodeSliceStrategy {
    fn tier(&self) -> Tier {
        Tier::DecodeSlice
    }

    async fn try_play(
        &self,
        ctx: &mut StrategyContext<'_>,
        request: &SegmentRequest,
    ) -> Option<ActivePlayback> {
        let pcm = ctx.decode_cache.get_or_create_for(&request.source).await?;

        let key = request.clip_key();
        let clip = ctx.clip_cache.path_for(&key);
        if !ctx
            .slicer
            .slice(&pcm, request.window.start, request.window.duration, &clip)
        {
            return None;
        }

        ctx.clip_cache.put(key, clip.clone());
        play_clip(ctx, &clip, self.tier()).map(ActivePlayback::one_shot)
    }
}

pub struct DirectSeekStrategy;

#[async_trait]
impl PlaybackStrategy for DirectSeekStrategy {
    fn tier(&self) -> Tier {
        Tier::DirectSeek
    }

    async fn try_play(
        &self,
        ctx: &mut StrategyContext<'_>,
        request: &SegmentRequest,
    ) -> Option<ActivePlayback> {
        // Only the small-window variant; a fully hidden seek player is not used
        if ctx.config.window_mode != WindowMode::SmallVisible {
            debug!("Direct seek needs the small-window player, skipping");
            return None;
        }
        let player = ctx.tools.resolve(Tool::SeekPlayer)?;

        let mut args: Vec<OsString> = ctx
            .config
            .window_mode
            .seek_player_args()
            .into_iter()
            .map(OsString::from)
            .collect();
        let start = format!("{:.3}", request.window.start);
        let duration = format!("{:.3}", request.window.duration);
        args.extend(os_args(&[
            "-autoexit",
            "-loglevel",
            "error",
            "-nostats",
            "-ss",
            start.as_str(),
            "-t",
            duration.as_str(),
        ]));
        args.push(request.source.resolved.clone().into_os_string());

        let mut process = match OneShotProcess::spawn(&player, args, "seek") {
            Ok(process) => process,
            Err(e) => {
                warn!(error = %e, "Could not spawn seek player");
                return None;
            }
        };

        match process.verify_started(ctx.config.process_grace).await {
            Ok(()) => Some(ActivePlayback::one_shot(process)),
            Err(e) => {
                warn!(error = %e, "Seek player exited immediately");
                None
            }
        }
    }
}

/// Transcoder argument shapes for a temp clip, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempClipVariant {
    /// `-ss` before `-i`: fast keyframe seek
    InputSeek,
    /// `-ss` after `-i`: decode-accurate seek for streams that mis-seek
    OutputSeek,
    /// No forced codec, channels or rate
    CodecAgnostic,
}

impl TempClipVariant {
    pub const ORDER: [TempClipVariant; 3] = [
        TempClipVariant::InputSeek,
        TempClipVariant::OutputSeek,
        TempClipVariant::CodecAgnostic,
    ];

    pub fn args(&self, source: &Path, start: f64, duration: f64, out: &Path) -> Vec<OsString> {
        let start = format!("{start:.3}");
        let duration = format!("{duration:.3}");
        let input = source.as_os_str().to_os_string();

        let mut args = os_args(&["-y", "-v", "error", "-nostdin"]);
        match self {
            TempClipVariant::InputSeek => {
                args.extend(os_args(&["-ss", start.as_str(), "-t", duration.as_str(), "-i"]));
                args.push(input);
                args.extend(os_args(CANONICAL_OUTPUT_ARGS));
            }
            TempClipVariant::OutputSeek => {
                args.push(OsString::from("-i"));
                args.push(input);
                args.extend(os_args(&["-ss", start.as_str(), "-t", duration.as_str()]));
                args.extend(os_args(CANONICAL_OUTPUT_ARGS));
            }
            TempClipVariant::CodecAgnostic => {
                args.extend(os_args(&["-ss", start.as_str(), "-i"]));
                args.push(input);
                args.extend(os_args(&["-t", duration.as_str(), "-vn"]));
            }
        }
        args.push(out.as_os_str().to_os_string());
        args
    }
}

const CANONICAL_OUTPUT_ARGS: &[&str] = &["-vn", "-ac", "1", "-ar", "16000", "-acodec", "pcm_s16le"];

fn os_args(items: &[&str]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}

pub struct TempClipStrategy;

impl TempClipStrategy {
    async fn run_variant(
        transcoder: &Path,
        variant: TempClipVariant,
        request: &SegmentRequest,
        out: &Path,
        config: &EngineConfig,
    ) -> bool {
        let mut command = Command::new(transcoder);
        command
            .args(variant.args(
                &request.source.resolved,
                request.window.start,
                request.window.duration,
                out,
            ))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(config.transcode_timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(?variant, error = %e, "Transcoder failed to run");
                return false;
            }
            Err(_) => {
                warn!(?variant, "Transcoder timed out");
                return false;
            }
        };

        let produced = std::fs::metadata(out).map(|m| m.len() > 0).unwrap_or(false);
        if output.status.success() && produced {
            return true;
        }
        debug!(
            ?variant,
            status = %output.status,
            stderr = %crate::player::process::shorten_diagnostic(&output.stderr),
            "Temp clip variant failed"
        );
        false
    }
}

#[async_trait]
impl PlaybackStrategy for TempClipStrategy {
    fn tier(&self) -> Tier {
        Tier::TempClip
    }

    async fn try_play(
        &self,
        ctx: &mut StrategyContext<'_>,
        request: &SegmentRequest,
    ) -> Option<ActivePlayback> {
        let transcoder = ctx.tools.resolve(Tool::Transcoder)?;
        if let Err(e) = std::fs::create_dir_all(ctx.config.temp_dir()) {
            warn!(error = %e, "Cannot create temp clip folder");
            return None;
        }
        let out = ctx
            .config
            .temp_dir()
            .join(format!("{TEMP_CLIP_PREFIX}{}.wav", Uuid::new_v4()));

        for variant in TempClipVariant::ORDER {
            if Self::run_variant(&transcoder, variant, request, &out, ctx.config).await {
                info!(?variant, clip = %out.display(), "Transcoded temp clip");
                return match play_clip(ctx, &out, self.tier()) {
                    Some(process) => Some(ActivePlayback::OneShot {
                        process,
                        temp_clip: Some(out),
                    }),
                    None => {
                        remove_file_logged(&out, "temp clip");
                        None
                    }
                };
            }
            remove_file_logged(&out, "temp clip");
        }
        None
    }
}
