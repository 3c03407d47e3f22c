//! Audio file inspection and canonical PCM slicing
//!
//! - `probe`: total duration of a source file, used to clamp segment windows
//! - `slicer`: frame-accurate sub-range extraction from canonical PCM files

pub mod probe;
pub mod slicer;

pub use probe::DurationProber;
pub use slicer::{SegmentSlicer, WavSlicer};

/// Canonical PCM sample rate
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Canonical PCM channel count
pub const CANONICAL_CHANNELS: u16 = 1;

/// Canonical PCM sample width
pub const CANONICAL_BITS_PER_SAMPLE: u16 = 16;
