//! Canonical-format WAV fixtures
//!
//! Every generator writes mono 16 kHz 16-bit PCM, the format the decode cache
//! produces, so a fixture can stand in for either a source recording or an
//! already-decoded cache entry.

use hound::{SampleFormat, WavSpec, WavWriter};
use segplay::audio::{CANONICAL_BITS_PER_SAMPLE, CANONICAL_CHANNELS, CANONICAL_SAMPLE_RATE};
use std::f32::consts::PI;
use std::path::Path;

pub const CANONICAL_RATE: u32 = CANONICAL_SAMPLE_RATE;

fn canonical_spec() -> WavSpec {
    WavSpec {
        channels: CANONICAL_CHANNELS,
        sample_rate: CANONICAL_RATE,
        bits_per_sample: CANONICAL_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Sine tone of `duration_ms` at `frequency_hz`, amplitude 0.0-1.0
///
/// Deterministic: the same arguments always produce the same bytes.
pub fn generate_tone_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, canonical_spec())?;
    let frames = CANONICAL_RATE as u64 * duration_ms / 1000;
    let peak = amplitude.clamp(0.0, 1.0) * i16::MAX as f32;

    for n in 0..frames {
        let t = n as f32 / CANONICAL_RATE as f32;
        let sample = (2.0 * PI * frequency_hz * t).sin() * peak;
        writer.write_sample(sample as i16)?;
    }
    writer.finalize()
}

#[test]
fn test_tone_has_expected_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    generate_tone_wav(&path, 1500, 440.0, 0.5).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, CANONICAL_RATE);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.spec().bits_per_sample, 16);
    assert_eq!(reader.duration(), 24_000);
}
