//! Integrated loudness measurement and loudness normalization
//!
//! Loudness is measured with the ITU-R BS.1770 / EBU R128 integrated
//! (gated) algorithm and expressed in LUFS. Normalization is a single
//! multiplicative gain derived from the loudness delta; it never limits,
//! so callers check the peak of the result to detect clipping.

use ebur128::{EbuR128, Mode};
use thiserror::Error;

use crate::types::{InterleavedBuffer, Sample};

/// Loudness measurement errors
///
/// Any of these means the buffer cannot be used as a track.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoudnessError {
    /// Buffer has no frames
    #[error("Cannot measure loudness of an empty buffer")]
    Empty,

    /// Buffer contains NaN or infinite samples
    #[error("Buffer contains non-finite samples")]
    NonFinite,

    /// Sample rate of zero
    #[error("Invalid sample rate: {0}Hz")]
    InvalidSampleRate(u32),

    /// The meter rejected its configuration or input
    #[error("Loudness meter error: {0}")]
    Meter(String),

    /// No gating block passed (digital silence or shorter than 400ms)
    #[error("Integrated loudness is undefined ({0}), audio is silent or too short")]
    Unmeasurable(f64),
}

/// Measure the integrated loudness of a buffer in LUFS
///
/// Deterministic and side-effect free. Fails on empty buffers, non-finite
/// samples, and audio whose integrated loudness is undefined.
pub fn measure(buffer: &InterleavedBuffer, sample_rate: u32) -> Result<f64, LoudnessError> {
    if buffer.is_empty() {
        return Err(LoudnessError::Empty);
    }
    if sample_rate == 0 {
        return Err(LoudnessError::InvalidSampleRate(sample_rate));
    }
    if !buffer.is_finite() {
        return Err(LoudnessError::NonFinite);
    }

    let mut meter = EbuR128::new(buffer.channels() as u32, sample_rate, Mode::I)
        .map_err(|e| LoudnessError::Meter(e.to_string()))?;
    meter
        .add_frames_f32(buffer.as_slice())
        .map_err(|e| LoudnessError::Meter(e.to_string()))?;
    let lufs = meter
        .loudness_global()
        .map_err(|e| LoudnessError::Meter(e.to_string()))?;

    if !lufs.is_finite() {
        return Err(LoudnessError::Unmeasurable(lufs));
    }

    log::debug!(
        "Measured {:.2} LUFS over {} frames ({:.1}s)",
        lufs,
        buffer.frames(),
        buffer.duration_seconds(sample_rate)
    );

    Ok(lufs)
}

/// Linear gain that moves `current_lufs` to `target_lufs`
///
/// Exactly 1.0 when the two are equal.
#[inline]
pub fn gain_for(current_lufs: f64, target_lufs: f64) -> Sample {
    db_to_linear(target_lufs - current_lufs) as Sample
}

/// Normalize a buffer from its measured loudness to a target loudness
///
/// The result is not clip-limited. Normalizing to the buffer's own
/// loudness returns an identical copy.
pub fn normalize(buffer: &InterleavedBuffer, current_lufs: f64, target_lufs: f64) -> InterleavedBuffer {
    let gain = gain_for(current_lufs, target_lufs);
    if gain == 1.0 {
        return buffer.clone();
    }
    buffer.scaled(gain)
}

/// Peak a buffer with the given peak would have after normalization
///
/// Scaling by a positive gain preserves ordering of magnitudes, so this is
/// exactly `normalize(..).peak()` without materializing the buffer.
#[inline]
pub fn normalized_peak(peak: Sample, current_lufs: f64, target_lufs: f64) -> Sample {
    peak * gain_for(current_lufs, target_lufs)
}

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    20.0 * linear.log10()
}
