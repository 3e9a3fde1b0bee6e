//! Pure-tone stimulus synthesis
//!
//! Renders a complete stereo clip for one trial: a sine wave at the requested
//! frequency with linear onset/offset ramps, routed to one or both ears and
//! scaled into 16-bit PCM.
//!
//! Interleaved sample index 0 is the logical left channel and index 1 the
//! logical right channel. Synthesis never swaps them; a playback target that
//! is wired reversed is handled at the delivery boundary with
//! [`ToneClip::swap_channels`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// Output sample rate (Hz)
pub const SAMPLE_RATE: u32 = 44_100;

/// Lowest synthesizable frequency (Hz)
pub const MIN_FREQUENCY_HZ: u32 = 20;

/// Highest synthesizable frequency (Hz)
pub const MAX_FREQUENCY_HZ: u32 = 20_000;

/// Longest clip we will render for a single trial (seconds)
pub const MAX_DURATION_S: f64 = 10.0;

/// Length of the onset and offset ramps (seconds)
pub const FADE_SECONDS: f64 = 0.010;

/// Fraction of 16-bit full scale reached by a tone at volume 1.0
pub const PEAK_FRACTION: f64 = 0.8;

const FULL_SCALE: f64 = i16::MAX as f64;

/// Target ear(s) for a tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Both,
    Left,
    Right,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Both => "both",
            Channel::Left => "left",
            Channel::Right => "right",
        }
    }

    fn gains(&self) -> (f64, f64) {
        match self {
            Channel::Both => (1.0, 1.0),
            Channel::Left => (1.0, 0.0),
            Channel::Right => (0.0, 1.0),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" => Ok(Channel::Both),
            "left" => Ok(Channel::Left),
            "right" => Ok(Channel::Right),
            other => Err(Error::Validation(format!(
                "Unknown channel '{}' (expected both, left or right)",
                other
            ))),
        }
    }
}

/// A rendered stereo PCM16 clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneClip {
    sample_rate: u32,
    /// Interleaved [left, right] frames
    samples: Vec<i16>,
}

impl ToneClip {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stereo frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn interleaved(&self) -> &[i16] {
        &self.samples
    }

    pub fn left(&self) -> impl Iterator<Item = i16> + '_ {
        self.samples.iter().step_by(2).copied()
    }

    pub fn right(&self) -> impl Iterator<Item = i16> + '_ {
        self.samples.iter().skip(1).step_by(2).copied()
    }

    /// Exchange the left and right channels of every frame
    pub fn swap_channels(mut self) -> Self {
        for frame in self.samples.chunks_exact_mut(2) {
            frame.swap(0, 1);
        }
        self
    }

    /// Raw interleaved little-endian PCM bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Encode as a RIFF/WAVE (PCM16, stereo) byte buffer
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + self.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
            for sample in &self.samples {
                writer.write_sample(*sample).map_err(wav_error)?;
            }
            writer.finalize().map_err(wav_error)?;
        }

        Ok(cursor.into_inner())
    }
}

fn wav_error(e: hound::Error) -> Error {
    match e {
        hound::Error::IoError(io) => Error::Io(io),
        other => Error::Io(std::io::Error::other(other)),
    }
}

/// Render a pure tone.
///
/// `volume` is a linear multiplier; values outside [0, 1] are clamped so the
/// output can never exceed [`PEAK_FRACTION`] of full scale.
///
/// # Errors
/// - [`Error::OutOfRange`] if `frequency_hz` is outside [20, 20000]
/// - [`Error::Validation`] if `duration_s` is not in (0, [`MAX_DURATION_S`]]
///   or `volume` is not finite
pub fn synthesize(frequency_hz: u32, duration_s: f64, volume: f64, channel: Channel) -> Result<ToneClip> {
    if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency_hz) {
        return Err(Error::OutOfRange(format!(
            "Frequency {} Hz outside audible range ({}-{} Hz)",
            frequency_hz, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ
        )));
    }
    if !duration_s.is_finite() || duration_s <= 0.0 || duration_s > MAX_DURATION_S {
        return Err(Error::Validation(format!(
            "Duration must be in (0, {}] seconds, got {}",
            MAX_DURATION_S, duration_s
        )));
    }
    if !volume.is_finite() {
        return Err(Error::Validation(format!("Volume must be finite, got {}", volume)));
    }

    let volume = volume.clamp(0.0, 1.0);
    let frames = frame_count(duration_s);
    let fade_len = fade_length(frames);
    let (left_gain, right_gain) = channel.gains();
    let scale = volume * PEAK_FRACTION * FULL_SCALE;
    let phase_step = TAU * frequency_hz as f64 / SAMPLE_RATE as f64;

    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let value = (phase_step * i as f64).sin() * envelope(i, frames, fade_len) * scale;
        samples.push(to_pcm16(value * left_gain));
        samples.push(to_pcm16(value * right_gain));
    }

    Ok(ToneClip {
        sample_rate: SAMPLE_RATE,
        samples,
    })
}

/// Samples per channel for a clip of `duration_s`
pub fn frame_count(duration_s: f64) -> usize {
    (SAMPLE_RATE as f64 * duration_s).round() as usize
}

fn fade_length(frames: usize) -> usize {
    let nominal = (SAMPLE_RATE as f64 * FADE_SECONDS).round() as usize;
    nominal.min(frames / 2)
}

/// Linear 0→1 ramp over `len` samples, inclusive at both ends
fn ramp(position: usize, len: usize) -> f64 {
    if len <= 1 {
        0.0
    } else {
        position as f64 / (len - 1) as f64
    }
}

fn envelope(i: usize, frames: usize, fade_len: usize) -> f64 {
    if i < fade_len {
        ramp(i, fade_len)
    } else if i >= frames - fade_len {
        1.0 - ramp(i - (frames - fade_len), fade_len)
    } else {
        1.0
    }
}

fn to_pcm16(value: f64) -> i16 {
    // Truncation toward zero after clamping keeps every sample within full scale
    value.clamp(-FULL_SCALE, FULL_SCALE) as i16
}
