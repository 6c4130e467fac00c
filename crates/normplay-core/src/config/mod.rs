//! Engine configuration
//!
//! YAML-backed settings for loudness targets, playback behavior and the
//! output device. Every section has serde defaults, so a partial file (or
//! none at all) yields a usable configuration.
//!
//! ```ignore
//! use normplay_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! ```

mod io;
mod loudness;
mod paths;
mod playback;

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

pub use io::{load_config, save_config};
pub use loudness::{LoudnessConfig, DEFAULT_MASTERING_TARGET_LUFS};
pub use paths::{config_dir, default_config_path, CONFIG_FILE_NAME};
pub use playback::{PlaybackConfig, DEFAULT_FADE_IN_FRAMES};

/// Everything the playback engine needs to know at construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub loudness: LoudnessConfig,
    pub playback: PlaybackConfig,
    pub audio: AudioConfig,
}
