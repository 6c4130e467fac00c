//! Loudness targets
//!
//! LUFS values are EBU R128 integrated loudness, as produced by
//! [`crate::loudness::measure`].

use serde::{Deserialize, Serialize};

use crate::mixing::DEFAULT_STEP_LU;

/// Reference loudness of the mastering view
pub const DEFAULT_MASTERING_TARGET_LUFS: f64 = -14.0;

/// Loudness normalization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Tracks louder than this are turned down to it in mastering mode.
    /// Quieter tracks are never boosted.
    /// Default: -14.0 LUFS
    pub mastering_target_lufs: f64,

    /// How far the shared mixing target drops per iteration while any
    /// track would clip.
    /// Default: 1.0 LU
    pub mixing_step_lu: f64,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            mastering_target_lufs: DEFAULT_MASTERING_TARGET_LUFS,
            mixing_step_lu: DEFAULT_STEP_LU,
        }
    }
}

impl LoudnessConfig {
    /// Mastering gain in dB for a track of the given loudness (never positive)
    ///
    /// ```
    /// use normplay_core::config::LoudnessConfig;
    ///
    /// let config = LoudnessConfig::default();
    /// assert!((config.mastering_gain_db(-8.0) + 6.0).abs() < 1e-9);
    /// assert_eq!(config.mastering_gain_db(-20.0), 0.0);
    /// ```
    pub fn mastering_gain_db(&self, track_lufs: f64) -> f64 {
        (self.mastering_target_lufs - track_lufs).min(0.0)
    }
}
