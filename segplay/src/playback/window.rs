//! Segment window normalization
//!
//! Turns a caller's (start, end, padding) request into a playable window
//! that is never shorter than the minimum duration and, once the file
//! length is known, never runs past the end of the file.

use crate::config::DEFAULT_MIN_DURATION_SECS;

/// Longest window ever played, seconds
pub const MAX_WINDOW_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Latest start position accepted, seconds
pub const MAX_START_SECS: f64 = 7.0 * MAX_WINDOW_SECS;

/// Caller-supplied padding and minimum length, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentOptions {
    pub pad_before: f64,
    pub pad_after: f64,
    pub min_duration: f64,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            pad_before: 0.0,
            pad_after: 0.0,
            min_duration: DEFAULT_MIN_DURATION_SECS,
        }
    }
}

impl SegmentOptions {
    /// Copy with negative/non-finite padding zeroed and a usable minimum
    pub fn sanitized(&self) -> Self {
        Self {
            pad_before: non_negative(self.pad_before),
            pad_after: non_negative(self.pad_after),
            min_duration: if self.min_duration.is_finite() && self.min_duration > 0.0 {
                self.min_duration
            } else {
                DEFAULT_MIN_DURATION_SECS
            },
        }
    }
}

/// A playable `[start, start + duration]` span, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentWindow {
    pub start: f64,
    pub duration: f64,
}

impl SegmentWindow {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Apply padding and the minimum duration to a raw request
///
/// Start and duration are capped at [`MAX_START_SECS`] and
/// [`MAX_WINDOW_SECS`] so an unclamped window stays representable as a
/// timer deadline.
pub fn normalize(start: f64, end: Option<f64>, options: &SegmentOptions) -> SegmentWindow {
    let options = options.sanitized();
    let min = options.min_duration;

    let start = (non_negative(start).min(MAX_START_SECS) - options.pad_before).max(0.0);
    let mut end = match end {
        Some(end) if end.is_finite() => end + options.pad_after,
        _ => start + min,
    };
    if end <= start {
        end = start + min;
    }

    let duration = (end - start).max(min).min(MAX_WINDOW_SECS);
    SegmentWindow { start, duration }
}

/// Fit a window inside a file of `total` seconds
pub fn clamp_to_total(window: SegmentWindow, total: f64, min_duration: f64) -> SegmentWindow {
    if !total.is_finite() || total <= 0.0 {
        return window;
    }

    let mut start = window.start;
    if start > total {
        start = (total - min_duration).max(0.0);
    }
    let end = (start + window.duration).min(total);
    let duration = end - start;

    if duration < min_duration {
        // Re-derive the start so the minimum fits inside the file
        let start = (total - min_duration).max(0.0);
        let duration = if total >= min_duration {
            min_duration
        } else {
            total - start
        };
        return SegmentWindow { start, duration };
    }

    SegmentWindow { start, duration }
}
