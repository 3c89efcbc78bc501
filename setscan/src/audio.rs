//! Audio acquisition: duration probing and per-window clip extraction
//!
//! Uses symphonia for format-agnostic decoding (MP3, FLAC, AAC, WAV, OGG, ...)
//! and rubato for resampling. Clips handed to the oracle are always mono at
//! the configured sample rate.

use crate::types::Window;
use anyhow::{Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Mono PCM clip for one window
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Mono samples (f32, range [-1.0, 1.0])
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Encode as 16-bit mono PCM WAV
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
            for &s in &self.samples {
                let pcm = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(pcm).context("Failed to write sample")?;
            }
            writer.finalize().context("Failed to finalize WAV data")?;
        }

        Ok(cursor.into_inner())
    }
}

/// Audio acquisition: total duration of a source file and clips of its windows
///
/// Implementations are blocking; callers run them off the async runtime.
pub trait ClipSource: Send + Sync {
    /// Total duration in seconds
    fn duration(&self, path: &Path) -> Result<f64>;

    fn materialize(&self, path: &Path, window: &Window) -> Result<AudioClip>;
}

/// Total duration of an audio file in seconds
///
/// Uses the container's frame count when present, otherwise decodes the whole
/// file and counts frames.
pub fn probe_duration(path: &Path) -> Result<f64> {
    let (mut format, track_id, params) = open_track(path)?;

    let sample_rate = params.sample_rate.context("Sample rate unknown")?;
    if let Some(n_frames) = params.n_frames {
        return Ok(n_frames as f64 / sample_rate as f64);
    }

    debug!(path = %path.display(), "Frame count not reported, decoding to measure duration");

    let mut decoder = make_decoder(&params)?;

    let mut frames: u64 = 0;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(e).context("Failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => frames += decoded.frames() as u64,
            Err(SymphoniaError::DecodeError(e)) => warn!("Decode error while probing: {}", e),
            Err(e) => return Err(e).context("Fatal decode error"),
        }
    }

    Ok(frames as f64 / sample_rate as f64)
}

/// Decodes windows of a source file into mono clips at a fixed sample rate
pub struct AudioSlicer {
    /// Output sample rate (Hz)
    target_sample_rate: u32,
}

impl AudioSlicer {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Decode `[window.start, window.end())` as mono at the native rate
    ///
    /// **Algorithm:**
    /// 1. Seek accurately to the window start; if the reader still lands past
    ///    it (or cannot seek), decode from the top instead
    /// 2. Position every packet by its timestamp, keep only frames inside the window
    /// 3. Down-mix to mono by averaging channels
    fn decode_window(&self, path: &Path, window: &Window) -> Result<(Vec<f32>, u32)> {
        let (mut format, track_id, params) = open_track(path)?;

        let native_rate = params.sample_rate.context("Sample rate unknown")?;
        let time_base = params.time_base;

        let mut decoder = make_decoder(&params)?;

        let start_frame = (window.start * native_rate as f64).round() as u64;
        let end_frame = (window.end() * native_rate as f64).round() as u64;

        let to_frame = |ts: u64| -> u64 {
            match time_base {
                Some(tb) => {
                    let t = tb.calc_time(ts);
                    ((t.seconds as f64 + t.frac) * native_rate as f64).round() as u64
                }
                None => ts,
            }
        };

        if window.start > 0.0 {
            let seek_to = SeekTo::Time {
                time: Time::from(window.start),
                track_id: Some(track_id),
            };
            match format.seek(SeekMode::Accurate, seek_to) {
                Ok(seeked) if to_frame(seeked.actual_ts) > start_frame => {
                    debug!(
                        actual_ts = seeked.actual_ts,
                        "Seek overshot {:.2}s, decoding from start", window.start
                    );
                    let (reopened, _, _) = open_track(path)?;
                    format = reopened;
                    decoder = make_decoder(&params)?;
                }
                Ok(seeked) => {
                    decoder.reset();
                    debug!(actual_ts = seeked.actual_ts, "Seeked to {:.2}s", window.start);
                }
                Err(e) => {
                    debug!("Seek failed ({}), decoding from start", e);
                }
            }
        }

        let mut mono = Vec::with_capacity(end_frame.saturating_sub(start_frame) as usize);
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(e).context("Failed to read packet"),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let packet_start = to_frame(packet.ts());
            if packet_start >= end_frame {
                break;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(e).context("Fatal decode error"),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let buf = sample_buf
                .get_or_insert_with(|| SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            if buf.capacity() < decoded.capacity() * channels {
                *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            }
            buf.copy_interleaved_ref(decoded);

            for (i, frame) in buf.samples().chunks(channels).enumerate() {
                let pos = packet_start + i as u64;
                if pos < start_frame {
                    continue;
                }
                if pos >= end_frame {
                    break;
                }
                mono.push(frame.iter().sum::<f32>() / channels as f32);
            }
        }

        debug!(
            start = window.start,
            length = window.length,
            frames = mono.len(),
            native_rate,
            "Decoded window"
        );

        Ok((mono, native_rate))
    }

    /// Resample mono PCM to the target rate
    ///
    /// High-quality sinc interpolation (BlackmanHarris2 window, 256 taps), single pass.
    fn resample_mono(&self, samples: Vec<f32>, source_rate: u32) -> Result<Vec<f32>> {
        if samples.is_empty() || source_rate == self.target_sample_rate {
            return Ok(samples);
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = self.target_sample_rate as f64 / source_rate as f64;
        let num_frames = samples.len();

        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
            .context("Failed to create rubato resampler")?;

        let mut output = resampler
            .process(&[samples], None)
            .context("Rubato resampling failed")?;

        let resampled = output.pop().unwrap_or_default();

        debug!(
            "Resampled {} frames ({} Hz) → {} frames ({} Hz)",
            num_frames,
            source_rate,
            resampled.len(),
            self.target_sample_rate
        );

        Ok(resampled)
    }
}

impl ClipSource for AudioSlicer {
    fn duration(&self, path: &Path) -> Result<f64> {
        probe_duration(path)
    }

    fn materialize(&self, path: &Path, window: &Window) -> Result<AudioClip> {
        let (mono, native_rate) = self
            .decode_window(path, window)
            .with_context(|| format!("Failed to decode {} at {:.2}s", path.display(), window.start))?;

        if mono.is_empty() {
            anyhow::bail!(
                "No audio decoded for window at {:.2}s of {}",
                window.start,
                path.display()
            );
        }

        let samples = self.resample_mono(mono, native_rate)?;

        Ok(AudioClip {
            samples,
            sample_rate: self.target_sample_rate,
        })
    }
}

fn make_decoder(params: &CodecParameters) -> Result<Box<dyn Decoder>> {
    symphonia::default::get_codecs()
        .make(params, &DecoderOptions::default())
        .context("Failed to create decoder")
}

/// Open a file and select its first decodable audio track
fn open_track(path: &Path) -> Result<(Box<dyn FormatReader>, u32, CodecParameters)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Failed to probe audio file: {}", path.display()))?;

    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found in file")?;

    let track_id = track.id;
    let params = track.codec_params.clone();

    Ok((format, track_id, params))
}
