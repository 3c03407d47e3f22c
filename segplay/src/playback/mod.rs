//! Segment playback
//!
//! - `window`: request normalization and clamping
//! - `state`: the explicit playback session state machine
//! - `strategy`: the `PlaybackStrategy` contract and the built-in tiers
//! - `orchestrator`: stop-before-play, validation and the tier walk

pub mod orchestrator;
pub mod state;
pub mod strategy;
pub mod window;

pub use orchestrator::{Orchestrator, OrchestratorBuilder, WarningHandler};
pub use state::{PlaybackSession, PlaybackStatus, SessionState};
pub use strategy::{
    default_strategies, ActivePlayback, PersistentSlot, PlaybackStrategy, SegmentRequest,
    StrategyContext, Tier,
};
pub use window::{SegmentOptions, SegmentWindow};
