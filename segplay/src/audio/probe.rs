//! Total duration probing
//!
//! Tried cheapest first:
//! 1. Container metadata (frame count / sample rate), no decoding
//! 2. The external prober's `format=duration`
//! 3. Full decode, counting frames
//!
//! Every stage failing yields `None`; callers then skip clamping.

use crate::error::{Error, Result};
use crate::tools::{Tool, ToolResolver};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::process::Command;
use tracing::{debug, warn};

/// Finds the total playable length of a source file
pub struct DurationProber {
    tools: Arc<ToolResolver>,
    timeout: Duration,
}

impl DurationProber {
    pub fn new(tools: Arc<ToolResolver>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// Total duration in seconds, or `None` if every probe fails
    pub async fn total_duration(&self, path: &Path) -> Option<f64> {
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || metadata_duration(&owned)).await {
            Ok(Ok(secs)) => {
                debug!(path = %path.display(), secs, "Duration from container metadata");
                return Some(secs);
            }
            Ok(Err(e)) => debug!(error = %e, "Metadata duration unavailable"),
            Err(e) => warn!(error = %e, "Metadata probe task failed"),
        }

        match self.prober_duration(path).await {
            Ok(secs) => {
                debug!(path = %path.display(), secs, "Duration from external prober");
                return Some(secs);
            }
            Err(e) => debug!(error = %e, "External prober unavailable"),
        }

        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || decoded_duration(&owned)).await {
            Ok(Ok(secs)) => {
                debug!(path = %path.display(), secs, "Duration from full decode");
                Some(secs)
            }
            Ok(Err(e)) => {
                warn!(path = %path.display(), error = %e, "Could not determine duration");
                None
            }
            Err(e) => {
                warn!(error = %e, "Decode probe task failed");
                None
            }
        }
    }

    async fn prober_duration(&self, path: &Path) -> Result<f64> {
        let prober = self.tools.require(Tool::Prober)?;

        let mut command = Command::new(&prober);
        command
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| Error::Probe(format!("prober timed out after {:?}", self.timeout)))??;

        if !output.status.success() {
            return Err(Error::Probe(format!("prober exited with {}", output.status)));
        }
        parse_prober_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the prober's bare `duration` value
fn parse_prober_output(stdout: &str) -> Result<f64> {
    let text = stdout.trim();
    let secs: f64 = text
        .parse()
        .map_err(|_| Error::Probe(format!("unparseable duration '{text}'")))?;
    if secs.is_finite() && secs > 0.0 {
        Ok(secs)
    } else {
        Err(Error::Probe(format!("non-positive duration {secs}")))
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Probe(format!("unrecognized container: {e}")))?;
    Ok(probed.format)
}

/// Duration from the container header alone
fn metadata_duration(path: &Path) -> Result<f64> {
    let format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Probe("no audio track".to_string()))?;

    let params = &track.codec_params;
    let frames = params
        .n_frames
        .ok_or_else(|| Error::Probe("frame count not in header".to_string()))?;
    let rate = params
        .sample_rate
        .filter(|r| *r > 0)
        .ok_or_else(|| Error::Probe("sample rate not in header".to_string()))?;

    Ok(frames as f64 / rate as f64)
}

/// Duration by decoding every packet
fn decoded_duration(path: &Path) -> Result<f64> {
    let mut format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Probe("no audio track".to_string()))?;

    let track_id = track.id;
    let params = track.codec_params.clone();
    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| Error::Probe(format!("no decoder: {e}")))?;

    let mut frames: u64 = 0;
    let mut rate = params.sample_rate.unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                debug!(error = %e, "Stopping decode probe");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                frames += decoded.frames() as u64;
                if rate == 0 {
                    rate = decoded.spec().rate;
                }
            }
            Err(SymphoniaError::DecodeError(e)) => debug!(error = e, "Skipping bad packet"),
            Err(e) => return Err(Error::Probe(format!("decode failed: {e}"))),
        }
    }

    if rate == 0 || frames == 0 {
        return Err(Error::Probe("no decodable audio".to_string()));
    }
    Ok(frames as f64 / rate as f64)
}
