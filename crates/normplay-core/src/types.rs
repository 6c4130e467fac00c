//! Common types for normplay
//!
//! Loudness modes, transport states and the interleaved sample buffer
//! shared by the loudness analyzer, tracks and the playback engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Audio sample type (32-bit float, full scale = ±1.0)
pub type Sample = f32;

/// Full-scale peak amplitude. A view whose peak reaches this value clips.
pub const FULL_SCALE: Sample = 1.0;

/// Which precomputed view of a track the player streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LoudnessMode {
    /// The decoded samples, untouched
    #[default]
    Raw = 0,
    /// Normalized to the loudness shared by every loaded track
    Mixing = 1,
    /// Turned down to the mastering reference if louder than it
    Mastering = 2,
}

impl LoudnessMode {
    /// All modes in display order
    pub const ALL: [LoudnessMode; 3] = [LoudnessMode::Raw, LoudnessMode::Mixing, LoudnessMode::Mastering];

    /// Decode from the atomic representation (unknown values map to Raw)
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => LoudnessMode::Mixing,
            2 => LoudnessMode::Mastering,
            _ => LoudnessMode::Raw,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Lowercase name, as used in config files and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            LoudnessMode::Raw => "raw",
            LoudnessMode::Mixing => "mixing",
            LoudnessMode::Mastering => "mastering",
        }
    }
}

impl fmt::Display for LoudnessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown loudness mode name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown loudness mode '{0}' (expected raw, mixing or mastering)")]
pub struct ParseModeError(pub String);

impl FromStr for LoudnessMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(LoudnessMode::Raw),
            "mixing" => Ok(LoudnessMode::Mixing),
            "mastering" => Ok(LoudnessMode::Mastering),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// Transport state of the playback engine
///
/// Paused and Stopped differ only in the cursor: Stopped always sits at frame 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PlayState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl PlayState {
    /// Decode from the atomic representation (unknown values map to Stopped)
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => PlayState::Playing,
            2 => PlayState::Paused,
            _ => PlayState::Stopped,
        }
    }
}

/// An immutable-by-convention buffer of interleaved multichannel samples
///
/// Frame `i` occupies `samples[i * channels..(i + 1) * channels]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterleavedBuffer {
    samples: Vec<Sample>,
    channels: usize,
}

impl InterleavedBuffer {
    /// Wrap interleaved samples
    ///
    /// A channel count of zero is treated as mono. A trailing partial frame
    /// is dropped so that the buffer always holds whole frames.
    pub fn from_interleaved(mut samples: Vec<Sample>, channels: usize) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self { samples, channels }
    }

    /// A buffer of `frames` frames of silence
    pub fn silence(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; frames * channels],
            channels,
        }
    }

    /// Number of channels per frame
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Interleaved samples for frames `start..end`
    ///
    /// `end` is clamped to the buffer length. Returns an empty slice when
    /// `start` is at or past the last frame.
    #[inline]
    pub fn frame_range(&self, start: usize, end: usize) -> &[Sample] {
        let frames = self.frames();
        if start >= frames || end <= start {
            return &[];
        }
        let end = end.min(frames);
        &self.samples[start * self.channels..end * self.channels]
    }

    /// Peak absolute amplitude across all channels
    pub fn peak(&self) -> Sample {
        self.samples.iter().fold(0.0, |peak, s| peak.max(s.abs()))
    }

    /// Whether every sample is a finite number
    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    /// A copy of this buffer with every sample multiplied by `gain`
    pub fn scaled(&self, gain: Sample) -> Self {
        Self {
            samples: self.samples.iter().map(|s| s * gain).collect(),
            channels: self.channels,
        }
    }

    /// Duration in seconds at the given sample rate
    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("raw".parse::<LoudnessMode>(), Ok(LoudnessMode::Raw));
        assert_eq!(" Mixing ".parse::<LoudnessMode>(), Ok(LoudnessMode::Mixing));
        assert_eq!("MASTERING".parse::<LoudnessMode>(), Ok(LoudnessMode::Mastering));
        assert!("loud".parse::<LoudnessMode>().is_err());

        for mode in LoudnessMode::ALL {
            assert_eq!(mode.to_string().parse::<LoudnessMode>(), Ok(mode));
            assert_eq!(LoudnessMode::from_u8(mode as u8), mode);
        }
    }

    #[test]
    fn test_play_state_from_u8() {
        assert_eq!(PlayState::from_u8(0), PlayState::Stopped);
        assert_eq!(PlayState::from_u8(1), PlayState::Playing);
        assert_eq!(PlayState::from_u8(2), PlayState::Paused);
        assert_eq!(PlayState::from_u8(7), PlayState::Stopped);
    }

    #[test]
    fn test_buffer_drops_partial_frame() {
        let buffer = InterleavedBuffer::from_interleaved(vec![0.1, 0.2, 0.3, 0.4, 0.5], 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.as_slice(), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_frame_range() {
        let buffer = InterleavedBuffer::from_interleaved((0..10).map(|i| i as f32).collect(), 2);
        assert_eq!(buffer.frame_range(1, 3), &[2.0, 3.0, 4.0, 5.0]);
        // End is clamped to the last frame
        assert_eq!(buffer.frame_range(4, 100), &[8.0, 9.0]);
        // Start at or past the end yields nothing
        assert!(buffer.frame_range(5, 8).is_empty());
        assert!(buffer.frame_range(50, 60).is_empty());
    }

    #[test]
    fn test_peak_uses_absolute_value() {
        let buffer = InterleavedBuffer::from_interleaved(vec![0.25, -0.75, 0.5, 0.1], 2);
        assert_eq!(buffer.peak(), 0.75);
        assert_eq!(buffer.scaled(2.0).peak(), 1.5);
    }
}
