//! Playback behavior settings

use serde::{Deserialize, Serialize};

use crate::types::LoudnessMode;

/// Length of the fade-in applied at every resume point
pub const DEFAULT_FADE_IN_FRAMES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Linear fade-in length in frames on play, seek and track switch.
    /// 0 disables the fade.
    pub fade_in_frames: usize,

    /// Loudness mode the engine starts in
    pub default_mode: LoudnessMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            fade_in_frames: DEFAULT_FADE_IN_FRAMES,
            default_mode: LoudnessMode::Raw,
        }
    }
}
