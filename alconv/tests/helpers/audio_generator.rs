//! WAV fixtures with known content

use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Write `frames` frames of a 16-bit ramp: sample `n` (interleaved) holds `n % 32768`
pub fn generate_ramp_wav<P: AsRef<Path>>(path: P, frames: u32, channels: u16) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_samples = frames as u64 * channels as u64;
    for n in 0..total_samples {
        writer.write_sample((n % 32768) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write silent audio with an arbitrary integer depth
pub fn generate_silent_wav<P: AsRef<Path>>(
    path: P,
    frames: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames as u64 * channels as u64 {
        writer.write_sample(0i32)?;
    }
    writer.finalize()?;
    Ok(())
}
