//! Audio Test Fixture Generator
//!
//! Writes synthetic recordings for end-to-end runs

use std::path::{Path, PathBuf};

/// Shape of a generated recording
#[derive(Debug, Clone)]
pub struct ToneConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Tone frequency in Hz
    pub frequency: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 100.0,
            sample_rate: 8_000,
            channels: 1,
            frequency: 440.0,
        }
    }
}

/// Generate a 16-bit PCM WAV holding a steady tone
pub fn generate_test_wav(path: &Path, config: &ToneConfig) -> anyhow::Result<PathBuf> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_frames = (config.duration_seconds * config.sample_rate as f64) as usize;

    for i in 0..total_frames {
        let t = i as f32 / config.sample_rate as f32;
        let sample =
            (0.3 * (2.0 * std::f32::consts::PI * config.frequency * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..config.channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(path.to_path_buf())
}
