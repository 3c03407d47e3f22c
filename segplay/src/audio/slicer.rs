//! Raw slicer
//!
//! Cuts a frame range straight out of a canonical PCM file with local binary
//! I/O, never calling the transcoder. The output keeps the source's format
//! parameters exactly.

use crate::cache::remove_file_logged;
use crate::error::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::path::Path;
use tracing::{debug, warn};

/// Extracts `[start, start + duration]` of a PCM file into a new file
pub trait SegmentSlicer: Send + Sync {
    /// True only if `out` now exists and is non-empty
    fn slice(&self, pcm: &Path, start_secs: f64, duration_secs: f64, out: &Path) -> bool;
}

/// Slicer for WAV containers
#[derive(Debug, Default, Clone, Copy)]
pub struct WavSlicer;

impl WavSlicer {
    pub fn new() -> Self {
        Self
    }

    /// Slice and report why a request was rejected
    ///
    /// Returns the number of frames written.
    pub fn try_slice(
        &self,
        pcm: &Path,
        start_secs: f64,
        duration_secs: f64,
        out: &Path,
    ) -> Result<u32> {
        let mut reader = WavReader::open(pcm)?;
        let spec = reader.spec();
        let total_frames = reader.duration();

        if spec.sample_rate == 0 || spec.channels == 0 || total_frames == 0 {
            return Err(Error::InvalidRange(format!(
                "degenerate source: rate={} channels={} frames={}",
                spec.sample_rate, spec.channels, total_frames
            )));
        }

        let (start_frame, end_frame) =
            frame_span(spec.sample_rate, total_frames, start_secs, duration_secs);
        if end_frame <= start_frame {
            return Err(Error::InvalidRange(format!(
                "empty span {start_frame}..{end_frame} of {total_frames} frames"
            )));
        }

        reader.seek(start_frame)?;
        let frame_count = end_frame - start_frame;
        let sample_count = frame_count as usize * spec.channels as usize;

        let mut writer = WavWriter::create(out, spec)?;
        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>().take(sample_count) {
                    writer.write_sample(sample?)?;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>().take(sample_count) {
                    writer.write_sample(sample?)?;
                }
            }
        }
        writer.finalize()?;

        debug!(
            pcm = %pcm.display(),
            out = %out.display(),
            start_frame,
            frame_count,
            "Sliced PCM range"
        );
        Ok(frame_count)
    }
}

impl SegmentSlicer for WavSlicer {
    fn slice(&self, pcm: &Path, start_secs: f64, duration_secs: f64, out: &Path) -> bool {
        match self.try_slice(pcm, start_secs, duration_secs, out) {
            Ok(_) => {
                let non_empty = std::fs::metadata(out).map(|m| m.len() > 0).unwrap_or(false);
                if !non_empty {
                    remove_file_logged(out, "empty slice");
                }
                non_empty
            }
            Err(e) => {
                warn!(pcm = %pcm.display(), error = %e, "Slice failed");
                remove_file_logged(out, "failed slice");
                false
            }
        }
    }
}

/// Frame range `[start, end)` for a window, clipped to the file
fn frame_span(rate: u32, total_frames: u32, start_secs: f64, duration_secs: f64) -> (u32, u32) {
    let rate = rate as f64;
    let start = (start_secs * rate).floor().max(0.0);
    let len = (duration_secs * rate).floor().max(0.0);

    let start_frame = start.min(total_frames as f64) as u32;
    let end_frame = (start + len).min(total_frames as f64) as u32;
    (start_frame, end_frame)
}
